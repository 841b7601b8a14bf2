//! Configuration negotiation for the selected device

use crate::candidate::OpenCandidate;
use crate::error::{Result, SelectError};
use crate::usb::{UsbDevice, UsbHandle};
use tracing::{debug, info};

/// What negotiation had to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// The required configuration was already active
    AlreadyActive(u8),
    /// The device was switched from `from` to `to`
    Switched { from: u8, to: u8 },
}

/// Make the live configuration equal the candidate's required value
///
/// Issues at most one set-configuration call. `label` names the device in
/// error messages.
pub fn ensure_configuration<D: UsbDevice>(
    open: &mut OpenCandidate<D>,
    label: &str,
) -> Result<Negotiation> {
    let required = open.candidate().config_value();

    let current = open
        .handle()
        .active_configuration()
        .map_err(|source| SelectError::GetConfiguration {
            device: label.to_string(),
            source,
        })?;

    if current == required {
        debug!("{} already in configuration {}", label, required);
        return Ok(Negotiation::AlreadyActive(current));
    }

    open.handle_mut()
        .set_active_configuration(required)
        .map_err(|source| SelectError::SetConfiguration {
            device: label.to_string(),
            value: required,
            source,
        })?;

    info!(
        "Switched {} from configuration {} to {}",
        label, current, required
    );
    Ok(Negotiation::Switched {
        from: current,
        to: required,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::find_devices;
    use crate::test_utils::{MockBus, MockDeviceSpec};

    fn open_single(bus: &MockBus) -> OpenCandidate<crate::test_utils::MockDevice> {
        let mut candidates = find_devices(bus).unwrap();
        candidates.remove(0).open().unwrap()
    }

    #[test]
    fn test_already_active_is_noop() {
        let bus = MockBus::new(vec![MockDeviceSpec::mtp(1).with_active_configuration(1)]);
        let ledger = bus.ledger();
        let mut open = open_single(&bus);

        let outcome = ensure_configuration(&mut open, "dev").unwrap();
        assert_eq!(outcome, Negotiation::AlreadyActive(1));
        assert!(ledger.set_configuration_calls().is_empty());
    }

    #[test]
    fn test_switches_once() {
        let bus = MockBus::new(vec![MockDeviceSpec::mtp(1).with_active_configuration(2)]);
        let ledger = bus.ledger();
        let mut open = open_single(&bus);

        let outcome = ensure_configuration(&mut open, "dev").unwrap();
        assert_eq!(outcome, Negotiation::Switched { from: 2, to: 1 });
        assert_eq!(ledger.set_configuration_calls(), vec![(1, 1)]);
        assert_eq!(ledger.active_configuration(1), 1);
    }

    #[test]
    fn test_get_configuration_failure() {
        let bus = MockBus::new(vec![MockDeviceSpec::mtp(1).fail_get_configuration()]);
        let mut open = open_single(&bus);

        let err = ensure_configuration(&mut open, "dev").unwrap_err();
        assert!(matches!(err, SelectError::GetConfiguration { .. }));
    }

    #[test]
    fn test_set_configuration_failure() {
        let bus = MockBus::new(vec![
            MockDeviceSpec::mtp(1)
                .with_active_configuration(0)
                .fail_set_configuration(),
        ]);
        let ledger = bus.ledger();
        let mut open = open_single(&bus);

        let err = ensure_configuration(&mut open, "dev").unwrap_err();
        assert!(matches!(err, SelectError::SetConfiguration { value: 1, .. }));
        assert_eq!(ledger.active_configuration(1), 0);
    }
}
