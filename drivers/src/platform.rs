#[derive(thiserror::Error, Debug, Clone)]
pub enum Error {
    #[error("{resource} failed ({message})")]
    Resource {
        resource: &'static str,
        message: String,
    },
}

/// Board resources wired to the chip: reset and standby lines, the external
/// clock and the supply regulators.
///
/// Line setters take the logical level, `true` asserts the line.
pub trait Platform: Send {
    fn set_reset(&mut self, asserted: bool) -> Result<(), Error>;

    fn set_standby(&mut self, asserted: bool) -> Result<(), Error>;

    fn enable_clock(&mut self) -> Result<(), Error>;

    fn disable_clock(&mut self);

    fn enable_regulators(&mut self) -> Result<(), Error>;

    fn disable_regulators(&mut self);
}

impl<T: Platform + ?Sized> Platform for Box<T> {
    fn set_reset(&mut self, asserted: bool) -> Result<(), Error> {
        (**self).set_reset(asserted)
    }

    fn set_standby(&mut self, asserted: bool) -> Result<(), Error> {
        (**self).set_standby(asserted)
    }

    fn enable_clock(&mut self) -> Result<(), Error> {
        (**self).enable_clock()
    }

    fn disable_clock(&mut self) {
        (**self).disable_clock()
    }

    fn enable_regulators(&mut self) -> Result<(), Error> {
        (**self).enable_regulators()
    }

    fn disable_regulators(&mut self) {
        (**self).disable_regulators()
    }
}

/// Board with hard-wired lines, a free-running clock and fixed supplies.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unmanaged;

impl Platform for Unmanaged {
    fn set_reset(&mut self, _asserted: bool) -> Result<(), Error> {
        Ok(())
    }

    fn set_standby(&mut self, _asserted: bool) -> Result<(), Error> {
        Ok(())
    }

    fn enable_clock(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn disable_clock(&mut self) {}

    fn enable_regulators(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn disable_regulators(&mut self) {}
}

pub const STANDBY_DELAY: std::time::Duration = std::time::Duration::from_micros(200);
pub const RESET_DELAY: std::time::Duration = std::time::Duration::from_millis(10);

/// Brings the chip out of reset, the caller must invalidate the page cache.
pub fn power_on<P: Platform + ?Sized>(platform: &mut P) -> Result<(), Error> {
    platform.set_reset(true)?;
    platform.enable_clock()?;
    if let Err(error) = platform.enable_regulators() {
        platform.disable_clock();
        return Err(error);
    }
    let sequence = |platform: &mut P| -> Result<(), Error> {
        platform.set_standby(true)?;
        std::thread::sleep(STANDBY_DELAY);
        platform.set_standby(false)?;
        std::thread::sleep(STANDBY_DELAY);
        platform.set_reset(false)?;
        std::thread::sleep(RESET_DELAY);
        Ok(())
    };
    if let Err(error) = sequence(platform) {
        platform.disable_regulators();
        platform.disable_clock();
        return Err(error);
    }
    Ok(())
}

/// Holds the chip in reset and cuts its supplies, line errors are logged.
pub fn power_off<P: Platform + ?Sized>(platform: &mut P) {
    if let Err(error) = platform.set_reset(true) {
        tracing::warn!("asserting reset failed: {}", error);
    }
    if let Err(error) = platform.set_standby(true) {
        tracing::warn!("asserting standby failed: {}", error);
    }
    std::thread::sleep(STANDBY_DELAY);
    platform.disable_regulators();
    platform.disable_clock();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<&'static str>,
        reset: bool,
        fail_regulators: bool,
        fail_reset_release: bool,
    }

    impl Platform for Recorder {
        fn set_reset(&mut self, asserted: bool) -> Result<(), Error> {
            self.events
                .push(if asserted { "reset on" } else { "reset off" });
            if !asserted && self.fail_reset_release {
                return Err(Error::Resource {
                    resource: "reset line",
                    message: "stuck".to_owned(),
                });
            }
            self.reset = asserted;
            Ok(())
        }

        fn set_standby(&mut self, asserted: bool) -> Result<(), Error> {
            self.events
                .push(if asserted { "standby on" } else { "standby off" });
            Ok(())
        }

        fn enable_clock(&mut self) -> Result<(), Error> {
            self.events.push("clock on");
            Ok(())
        }

        fn disable_clock(&mut self) {
            self.events.push("clock off");
        }

        fn enable_regulators(&mut self) -> Result<(), Error> {
            if self.fail_regulators {
                return Err(Error::Resource {
                    resource: "regulators",
                    message: "unavailable".to_owned(),
                });
            }
            self.events.push("regulators on");
            Ok(())
        }

        fn disable_regulators(&mut self) {
            self.events.push("regulators off");
        }
    }

    #[test]
    fn power_sequence() -> Result<(), Error> {
        let mut recorder = Recorder::default();
        power_on(&mut recorder)?;
        power_off(&mut recorder);
        assert_eq!(
            recorder.events,
            vec![
                "reset on",
                "clock on",
                "regulators on",
                "standby on",
                "standby off",
                "reset off",
                "reset on",
                "standby on",
                "regulators off",
                "clock off",
            ]
        );
        Ok(())
    }

    #[test]
    fn clock_unwound_when_regulators_fail() {
        let mut recorder = Recorder {
            fail_regulators: true,
            ..Default::default()
        };
        assert!(power_on(&mut recorder).is_err());
        assert_eq!(recorder.events, vec!["reset on", "clock on", "clock off"]);
    }

    #[test]
    fn reset_pulsed_when_line_starts_released() -> Result<(), Error> {
        let mut recorder = Recorder {
            reset: false,
            ..Default::default()
        };
        power_on(&mut recorder)?;
        assert!(!recorder.reset);
        let asserted = recorder
            .events
            .iter()
            .position(|event| *event == "reset on")
            .expect("reset is asserted");
        let released = recorder
            .events
            .iter()
            .position(|event| *event == "reset off")
            .expect("reset is released");
        let clock = recorder
            .events
            .iter()
            .position(|event| *event == "clock on")
            .expect("clock is enabled");
        assert!(asserted < clock);
        assert!(clock < released);
        Ok(())
    }

    #[test]
    fn supplies_unwound_when_lines_fail() {
        let mut recorder = Recorder {
            fail_reset_release: true,
            ..Default::default()
        };
        assert!(power_on(&mut recorder).is_err());
        assert_eq!(
            recorder.events[recorder.events.len() - 2..],
            ["regulators off", "clock off"]
        );
    }
}
