use tracing::debug;

use crate::{
    abi::{Event, Subscription, SubscriptionKind, EVENT_SIZE, SUBSCRIPTION_SIZE},
    errno::Errno,
    memory::{GuestMemory, Region},
};

/// Evaluate one subscription. Nothing here blocks: clock subscriptions fire
/// at once and fd readiness is not implemented.
fn evaluate(sub: &Subscription) -> Event {
    let errno = match sub.kind {
        SubscriptionKind::Clock(clock) => {
            debug!(
                "userdata={:#x} clock id={} timeout={} precision={} abstime={} fires immediately",
                sub.userdata,
                clock.id,
                clock.timeout,
                clock.precision,
                clock.is_absolute()
            );
            Errno::Success
        }
        SubscriptionKind::FdRead { fd } | SubscriptionKind::FdWrite { fd } => {
            debug!("userdata={:#x} fd={} readiness is not supported", sub.userdata, fd);
            Errno::Notsup
        }
        SubscriptionKind::Unknown(tag) => {
            debug!("userdata={:#x} unknown subscription type {}", sub.userdata, tag);
            Errno::Inval
        }
    };
    Event::for_subscription(sub, errno)
}

/// `poll_oneoff(in, out, nsubscriptions, result.nevents)`
///
/// Every region is validated before any subscription is read, so a fault or
/// `EINVAL` leaves guest memory untouched. On success one event is written
/// per subscription, in order, and `nevents == nsubscriptions`.
pub fn poll_oneoff<M: GuestMemory + ?Sized>(
    mem: &mut M,
    input: u32,
    output: u32,
    nsubscriptions: u32,
    result_nevents: u32,
) -> Result<(), Errno> {
    let nevents_out = Region::acquire(mem, result_nevents, 4)?;
    if nsubscriptions == 0 {
        debug!("pollOneoff(in={},out={},nsubscriptions=0) -> EINVAL", input, output);
        return Err(Errno::Inval);
    }
    let subscriptions = Region::array(mem, input, nsubscriptions, SUBSCRIPTION_SIZE)?;
    let events_out = Region::array(mem, output, nsubscriptions, EVENT_SIZE)?;

    // Decode everything first: `in` and `out` may overlap.
    let events = subscriptions
        .bytes(mem)?
        .chunks_exact(SUBSCRIPTION_SIZE as usize)
        .map(|raw| {
            Subscription::parse(raw)
                .map(|sub| evaluate(&sub))
                .ok_or(Errno::Fault)
        })
        .collect::<Result<Vec<_>, Errno>>()?;

    let slots = events_out.bytes_mut(mem)?;
    for (event, slot) in events
        .iter()
        .zip(slots.chunks_exact_mut(EVENT_SIZE as usize))
    {
        event.write_to(slot)?;
    }
    nevents_out.write(mem, &nsubscriptions.to_le_bytes())?;

    debug!(
        "pollOneoff(in={},out={},nsubscriptions={}) -> nevents={}",
        input, output, nsubscriptions, nsubscriptions
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{ClockSubscription, EVENT_TYPE_CLOCK, EVENT_TYPE_FD_WRITE};
    use crate::memory::LinearMemory;

    fn clock_sub(userdata: u64) -> Subscription {
        Subscription::clock(
            userdata,
            ClockSubscription {
                id: 1,
                timeout: 1,
                precision: 1,
                flags: 0,
            },
        )
    }

    #[test]
    fn test_mixed_batch_keeps_order() {
        let mut mem = LinearMemory::new(1);
        let subs = [
            clock_sub(10),
            Subscription {
                userdata: 11,
                kind: SubscriptionKind::FdWrite { fd: 1 },
            },
            Subscription {
                userdata: 12,
                kind: SubscriptionKind::Unknown(9),
            },
            clock_sub(13),
        ];
        for (i, sub) in subs.iter().enumerate() {
            assert!(mem.write(i as u32 * SUBSCRIPTION_SIZE, &sub.encode()));
        }

        poll_oneoff(&mut mem, 0, 1024, 4, 2048).unwrap();
        assert_eq!(mem.read_u32_le(2048), Some(4));

        let events: Vec<Event> = (0..4)
            .map(|i| Event::parse(mem.read(1024 + i * EVENT_SIZE, 32).unwrap()).unwrap())
            .collect();
        assert_eq!(
            events,
            vec![
                Event {
                    userdata: 10,
                    errno: Errno::Success,
                    event_type: EVENT_TYPE_CLOCK
                },
                Event {
                    userdata: 11,
                    errno: Errno::Notsup,
                    event_type: EVENT_TYPE_FD_WRITE
                },
                Event {
                    userdata: 12,
                    errno: Errno::Inval,
                    event_type: 9
                },
                Event {
                    userdata: 13,
                    errno: Errno::Success,
                    event_type: EVENT_TYPE_CLOCK
                },
            ]
        );
    }

    #[test]
    fn test_in_and_out_may_overlap() {
        let mut mem = LinearMemory::new(1);
        assert!(mem.write(0, &clock_sub(42).encode()));
        assert!(mem.write(SUBSCRIPTION_SIZE, &clock_sub(43).encode()));

        poll_oneoff(&mut mem, 0, 0, 2, 512).unwrap();

        let first = Event::parse(mem.read(0, 32).unwrap()).unwrap();
        let second = Event::parse(mem.read(32, 32).unwrap()).unwrap();
        assert_eq!((first.userdata, second.userdata), (42, 43));
    }

    #[test]
    fn test_zero_subscriptions_after_nevents_check() {
        let mut mem = LinearMemory::new(1);
        assert_eq!(
            poll_oneoff(&mut mem, 0, 128, 0, 512),
            Err(Errno::Inval)
        );
        assert_eq!(
            poll_oneoff(&mut mem, 0, 128, 0, 65536),
            Err(Errno::Fault)
        );
    }

    #[test]
    fn test_huge_count_faults() {
        let mut mem = LinearMemory::new(1);
        mem.fill(b'?');
        assert_eq!(
            poll_oneoff(&mut mem, 0, 128, u32::MAX, 512),
            Err(Errno::Fault)
        );
        assert!(mem.as_slice().iter().all(|b| *b == b'?'));
    }
}
