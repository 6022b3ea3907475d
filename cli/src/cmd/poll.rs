use anyhow::{Context, Result as AnyhowResult};
use hostabi_sandbox::{
    abi::{
        ClockSubscription, Event, Subscription, SubscriptionKind, EVENT_SIZE, EVENT_TYPE_CLOCK,
        EVENT_TYPE_FD_READ, EVENT_TYPE_FD_WRITE, SUBSCRIPTION_SIZE,
    },
    ClockId, Errno, GuestMemory, HostCall, PAGE_SIZE,
};

use crate::cmd::open_host;

fn event_type_name(event_type: u8) -> &'static str {
    match event_type {
        EVENT_TYPE_CLOCK => "clock",
        EVENT_TYPE_FD_READ => "fd_read",
        EVENT_TYPE_FD_WRITE => "fd_write",
        _ => "unknown",
    }
}

/// Poll one relative monotonic clock subscription (userdata 0) followed by an
/// `fd_read` subscription per descriptor, then print one line per event.
pub fn poll_command(
    stdout: &mut impl std::io::Write,
    deterministic: bool,
    timeout: u64,
    fds: Vec<u32>,
) -> AnyhowResult<()> {
    let host = open_host(deterministic, Vec::new())?;
    let mut mem = host.new_memory();

    let mut subscriptions = vec![Subscription::clock(
        0,
        ClockSubscription {
            id: ClockId::Monotonic as u8,
            timeout,
            precision: 0,
            flags: 0,
        },
    )];
    subscriptions.extend(fds.iter().enumerate().map(|(i, fd)| Subscription {
        userdata: i as u64 + 1,
        kind: SubscriptionKind::FdRead { fd: *fd },
    }));

    let count = u32::try_from(subscriptions.len()).context("too many subscriptions")?;
    let input = 0u32;
    let output = count
        .checked_mul(SUBSCRIPTION_SIZE)
        .context("too many subscriptions")?;
    let result_nevents = count
        .checked_mul(EVENT_SIZE)
        .and_then(|events| output.checked_add(events))
        .context("too many subscriptions")?;

    let needed = u64::from(result_nevents) + 4;
    if needed > mem.size() {
        let delta = (needed - mem.size()).div_ceil(u64::from(PAGE_SIZE));
        let delta = u32::try_from(delta).context("subscriptions do not fit in guest memory")?;
        mem.grow(delta)
            .context("subscriptions do not fit in guest memory")?;
        tracing::debug!("grew guest memory to {} pages for {} subscriptions", mem.pages(), count);
    }

    for (i, sub) in subscriptions.iter().enumerate() {
        let offset = input + i as u32 * SUBSCRIPTION_SIZE;
        anyhow::ensure!(
            mem.write(offset, &sub.encode()),
            "subscriptions do not fit in guest memory"
        );
    }

    let errno = host.call(
        &mut mem,
        HostCall::PollOneoff {
            input,
            output,
            nsubscriptions: count,
            result_nevents,
        },
    );
    if errno != Errno::Success {
        anyhow::bail!("poll_oneoff failed: {}", errno);
    }

    let nevents = mem
        .read_u32_le(result_nevents)
        .context("event count not written")?;
    writeln!(stdout, "nevents: {}", nevents)?;

    for i in 0..nevents {
        let raw = mem
            .read(output + i * EVENT_SIZE, EVENT_SIZE as usize)
            .context("event outside guest memory")?;
        let event = Event::parse(raw).context("malformed event")?;
        writeln!(
            stdout,
            "userdata={} type={} errno={}",
            event.userdata,
            event_type_name(event.event_type),
            event.errno
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::poll_command;

    #[test]
    fn clock_only() {
        let mut buf = Vec::new();
        poll_command(&mut buf, true, 1_000, Vec::new()).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "nevents: 1\nuserdata=0 type=clock errno=ESUCCESS\n"
        );
    }

    #[test]
    fn fd_subscriptions_are_not_supported() {
        let mut buf = Vec::new();
        poll_command(&mut buf, true, 0, vec![0, 5]).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "nevents: 3\n\
             userdata=0 type=clock errno=ESUCCESS\n\
             userdata=1 type=fd_read errno=ENOTSUP\n\
             userdata=2 type=fd_read errno=ENOTSUP\n"
        );
    }

    #[test]
    fn batch_larger_than_one_page() {
        let mut buf = Vec::new();
        poll_command(&mut buf, true, 0, vec![3; 2000]).unwrap();
        let out = String::from_utf8(buf).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("nevents: 2001"));
        assert_eq!(lines.next(), Some("userdata=0 type=clock errno=ESUCCESS"));
        assert_eq!(lines.last(), Some("userdata=2000 type=fd_read errno=ENOTSUP"));
    }
}
