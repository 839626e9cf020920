//! GPIO-backed actuator

use embedded_hal::digital::OutputPin;

use super::traits::{Actuator, ActuatorError};

/// Drives an LED on a single output pin
pub struct PinActuator<P> {
    pin: P,
    /// Pin level is inverted (LED wired to VCC)
    active_low: bool,
}

impl<P: OutputPin> PinActuator<P> {
    pub fn new(pin: P, active_low: bool) -> Self {
        Self { pin, active_low }
    }

    /// Release the underlying pin
    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> Actuator for PinActuator<P> {
    fn configure(&mut self) -> Result<(), ActuatorError> {
        self.set_level(false)
    }

    fn set_level(&mut self, on: bool) -> Result<(), ActuatorError> {
        let high = on != self.active_low;
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        result.map_err(|_| ActuatorError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::digital::{ErrorKind, ErrorType};

    #[derive(Default)]
    struct MockPin {
        high: Option<bool>,
        fail: bool,
    }

    impl ErrorType for MockPin {
        type Error = ErrorKind;
    }

    impl OutputPin for MockPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            self.high = Some(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            self.high = Some(true);
            Ok(())
        }
    }

    #[test]
    fn test_active_high() {
        let mut actuator = PinActuator::new(MockPin::default(), false);
        actuator.configure().unwrap();
        assert_eq!(actuator.pin.high, Some(false));

        actuator.set_level(true).unwrap();
        assert_eq!(actuator.pin.high, Some(true));
    }

    #[test]
    fn test_active_low_inverts() {
        let mut actuator = PinActuator::new(MockPin::default(), true);
        actuator.configure().unwrap();
        assert_eq!(actuator.pin.high, Some(true));

        actuator.set_level(true).unwrap();
        assert_eq!(actuator.into_inner().high, Some(false));
    }

    #[test]
    fn test_pin_error() {
        let pin = MockPin {
            fail: true,
            ..Default::default()
        };
        let mut actuator = PinActuator::new(pin, false);
        assert_eq!(actuator.configure(), Err(ActuatorError));
        assert_eq!(actuator.set_level(true), Err(ActuatorError));
    }
}
