//! Accessibility dump retrieval with bounded retry.
//!
//! `uiautomator dump` is asynchronous and occasionally writes a truncated or
//! empty file; a bounded retry with a short delay absorbs that without
//! blocking indefinitely. A dump counts only once the returned document
//! carries the hierarchy root marker.

use crate::config::Config;
use crate::device::DeviceControl;
use crate::poll::poll_until;
use crate::uitree::UiSnapshot;

/// Fetch a fresh accessibility snapshot, or `None` after exhausting retries.
pub fn fetch(dev: &dyn DeviceControl, config: &Config) -> Option<UiSnapshot> {
    let timing = &config.timing;
    poll_until(timing.dump_attempts, timing.dump_delay, || {
        dev.run(
            &["uiautomator", "dump", &config.app.dump_path],
            timing.command_timeout,
        );
        let xml = dev
            .shell(&["cat", &config.app.dump_path], timing.command_timeout)
            .ok()?;
        UiSnapshot::parse(&xml)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceError, DeviceResult};
    use std::cell::RefCell;
    use std::time::Duration;

    /// Replays a fixed sequence of `cat` responses.
    struct FlakyDump {
        responses: RefCell<Vec<DeviceResult<String>>>,
    }

    impl FlakyDump {
        fn new(responses: Vec<DeviceResult<String>>) -> Self {
            Self {
                responses: RefCell::new(responses),
            }
        }
    }

    impl DeviceControl for FlakyDump {
        fn shell(&self, args: &[&str], _timeout: Duration) -> DeviceResult<String> {
            assert_eq!(args[0], "cat");
            let mut responses = self.responses.borrow_mut();
            if responses.is_empty() {
                Ok(String::new())
            } else {
                responses.remove(0)
            }
        }

        fn run(&self, _args: &[&str], _timeout: Duration) {}
    }

    const GOOD_DUMP: &str = r#"<hierarchy rotation="0"><node text="" resource-id="" class="android.widget.FrameLayout" bounds="[0,0][1080,2400]" focused="false" focusable="false" /></hierarchy>"#;

    fn zero_delay_config() -> Config {
        let mut config = Config::defaults();
        config.timing.dump_delay = Duration::ZERO;
        config
    }

    #[test]
    fn test_fetch_retries_past_truncated_dumps() {
        let dev = FlakyDump::new(vec![
            Ok(String::new()),
            Err(DeviceError::CommandFailed {
                command: "cat".to_string(),
                detail: "No such file".to_string(),
            }),
            Ok(GOOD_DUMP.to_string()),
        ]);
        let snap = fetch(&dev, &zero_delay_config()).unwrap();
        assert_eq!(snap.nodes.len(), 1);
    }

    #[test]
    fn test_fetch_gives_up_after_budget() {
        let dev = FlakyDump::new((0..10).map(|_| Ok(String::new())).collect());
        assert!(fetch(&dev, &zero_delay_config()).is_none());
    }
}
