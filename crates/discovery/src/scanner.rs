//! Descriptor scanning
//!
//! Recognizes the MTP transport shape: an alternate setting with exactly
//! three endpoints, one interrupt IN (events), one bulk IN (data from the
//! device) and one bulk OUT (data to the device). The interface class is not
//! consulted; many phones report vendor-specific classes for MTP.

use crate::candidate::{Candidate, MtpEndpoints};
use crate::usb::{AltSetting, UsbDevice};
use rusb::{Direction, TransferType};
use tracing::{debug, trace};

/// Classify the endpoints of one alternate setting
///
/// Returns the endpoint triple only if the setting has exactly three
/// endpoints and each role is filled with a non-zero address.
pub fn classify_endpoints(alt: &AltSetting) -> Option<MtpEndpoints> {
    if alt.endpoints.len() != 3 {
        return None;
    }

    let mut event = None;
    let mut fetch = None;
    let mut send = None;

    for ep in &alt.endpoints {
        match (ep.direction, ep.transfer_type) {
            (Direction::In, TransferType::Interrupt) => event = Some(ep.address),
            (Direction::In, TransferType::Bulk) => fetch = Some(ep.address),
            (Direction::Out, TransferType::Bulk) => send = Some(ep.address),
            _ => {}
        }
    }

    match (event, fetch, send) {
        (Some(event), Some(fetch), Some(send)) if event != 0 && fetch != 0 && send != 0 => {
            Some(MtpEndpoints { event, fetch, send })
        }
        _ => None,
    }
}

/// Scan one device for the MTP endpoint triple
///
/// The first matching alternate setting wins. Descriptor read failures end
/// the scan of this device and yield `None`; they are never errors for the
/// caller. The returned candidate holds its own reference to `device`.
pub fn scan_device<D: UsbDevice>(device: &D) -> Option<Candidate<D>> {
    let descriptor = match device.device_descriptor() {
        Ok(desc) => desc,
        Err(e) => {
            debug!("Skipping device: device descriptor unavailable: {}", e);
            return None;
        }
    };

    for index in 0..descriptor.num_configurations {
        let config = match device.config_descriptor(index) {
            Ok(config) => config,
            Err(e) => {
                debug!(
                    "Skipping device {}: config descriptor {} unavailable: {}",
                    descriptor.vid_pid(),
                    index,
                    e
                );
                return None;
            }
        };

        for interface in &config.interfaces {
            for alt in &interface.alt_settings {
                if let Some(endpoints) = classify_endpoints(alt) {
                    trace!(
                        "Device {} matches MTP shape: config={}, interface={}, alt={}, endpoints={:?}",
                        descriptor.vid_pid(),
                        config.value,
                        alt.interface_number,
                        alt.setting_number,
                        endpoints
                    );
                    return Some(Candidate::new(
                        device.clone(),
                        descriptor,
                        alt.clone(),
                        config.value,
                        endpoints,
                    ));
                }
            }
        }
    }

    trace!("Device {} has no MTP-shaped interface", descriptor.vid_pid());
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        MockBus, MockDeviceSpec, bulk_in, bulk_out, interrupt_in, mtp_alt_setting, alt_setting,
        config,
    };
    use crate::usb::UsbBus;

    fn scan_single(spec: MockDeviceSpec) -> Option<MtpEndpoints> {
        let bus = MockBus::new(vec![spec]);
        let devices = bus.devices().unwrap();
        scan_device(&devices[0]).map(|c| c.endpoints())
    }

    #[test]
    fn test_classify_mtp_triple() {
        let endpoints = classify_endpoints(&mtp_alt_setting(0)).unwrap();
        assert_eq!(
            endpoints,
            MtpEndpoints {
                event: 0x83,
                fetch: 0x81,
                send: 0x02,
            }
        );
    }

    #[test]
    fn test_classify_order_independent() {
        let alt = alt_setting(0, 0, vec![bulk_out(0x01), interrupt_in(0x85), bulk_in(0x82)]);
        let endpoints = classify_endpoints(&alt).unwrap();
        assert_eq!(endpoints.event, 0x85);
        assert_eq!(endpoints.fetch, 0x82);
        assert_eq!(endpoints.send, 0x01);
    }

    #[test]
    fn test_classify_rejects_wrong_endpoint_count() {
        let four = alt_setting(
            0,
            0,
            vec![interrupt_in(0x83), bulk_in(0x81), bulk_out(0x02), bulk_out(0x04)],
        );
        assert!(classify_endpoints(&four).is_none());

        let two = alt_setting(0, 0, vec![bulk_in(0x81), bulk_out(0x02)]);
        assert!(classify_endpoints(&two).is_none());

        let none = alt_setting(0, 0, vec![]);
        assert!(classify_endpoints(&none).is_none());
    }

    #[test]
    fn test_classify_rejects_duplicate_role() {
        // Two bulk IN, no interrupt IN
        let alt = alt_setting(0, 0, vec![bulk_in(0x81), bulk_in(0x83), bulk_out(0x02)]);
        assert!(classify_endpoints(&alt).is_none());
    }

    #[test]
    fn test_classify_rejects_zero_address() {
        let alt = alt_setting(0, 0, vec![interrupt_in(0x83), bulk_in(0x81), bulk_out(0x00)]);
        assert!(classify_endpoints(&alt).is_none());
    }

    #[test]
    fn test_scan_mtp_device() {
        let bus = MockBus::new(vec![MockDeviceSpec::mtp(1)]);
        let devices = bus.devices().unwrap();
        let candidate = scan_device(&devices[0]).unwrap();

        assert_eq!(candidate.config_value(), 1);
        assert_eq!(candidate.interface().interface_number, 0);
        assert_eq!(candidate.endpoints().send, 0x02);
    }

    #[test]
    fn test_scan_non_mtp_device() {
        assert!(scan_single(MockDeviceSpec::mass_storage(1)).is_none());
    }

    #[test]
    fn test_scan_device_without_configurations() {
        assert!(scan_single(MockDeviceSpec::mtp(1).with_configs(vec![])).is_none());
    }

    #[test]
    fn test_scan_finds_later_alt_setting() {
        let spec = MockDeviceSpec::mtp(1).with_configs(vec![config(
            1,
            vec![vec![
                alt_setting(0, 0, vec![]),
                alt_setting(0, 1, vec![interrupt_in(0x87), bulk_in(0x86), bulk_out(0x05)]),
            ]],
        )]);
        let endpoints = scan_single(spec).unwrap();
        assert_eq!(endpoints.event, 0x87);
    }

    #[test]
    fn test_scan_first_match_wins() {
        let spec = MockDeviceSpec::mtp(1).with_configs(vec![
            config(
                1,
                vec![
                    vec![alt_setting(0, 0, vec![bulk_in(0x81), bulk_out(0x01)])],
                    vec![alt_setting(1, 0, vec![interrupt_in(0x83), bulk_in(0x82), bulk_out(0x02)])],
                ],
            ),
            config(
                2,
                vec![vec![alt_setting(0, 0, vec![interrupt_in(0x86), bulk_in(0x85), bulk_out(0x04)])]],
            ),
        ]);
        let bus = MockBus::new(vec![spec]);
        let devices = bus.devices().unwrap();
        let candidate = scan_device(&devices[0]).unwrap();

        assert_eq!(candidate.config_value(), 1);
        assert_eq!(candidate.interface().interface_number, 1);
        assert_eq!(candidate.endpoints().event, 0x83);
    }

    #[test]
    fn test_scan_second_configuration() {
        let spec = MockDeviceSpec::mtp(1).with_configs(vec![
            config(1, vec![vec![alt_setting(0, 0, vec![bulk_in(0x81), bulk_out(0x01)])]]),
            config(2, vec![vec![mtp_alt_setting(0)]]),
        ]);
        let bus = MockBus::new(vec![spec]);
        let devices = bus.devices().unwrap();
        let candidate = scan_device(&devices[0]).unwrap();

        assert_eq!(candidate.config_value(), 2);
    }

    #[test]
    fn test_scan_device_descriptor_failure() {
        assert!(scan_single(MockDeviceSpec::mtp(1).fail_device_descriptor()).is_none());
    }

    #[test]
    fn test_scan_config_descriptor_failure_aborts_device() {
        // Config index 0 unreadable; the MTP interface in index 1 is never examined
        let spec = MockDeviceSpec::mtp(1)
            .with_configs(vec![
                config(1, vec![vec![mtp_alt_setting(0)]]),
                config(2, vec![vec![mtp_alt_setting(0)]]),
            ])
            .fail_config_descriptor(0);
        assert!(scan_single(spec).is_none());
    }

    #[test]
    fn test_scan_takes_new_reference() {
        let bus = MockBus::new(vec![MockDeviceSpec::mtp(9)]);
        let ledger = bus.ledger();
        let devices = bus.devices().unwrap();
        assert_eq!(ledger.live_references(9), 1);

        let candidate = scan_device(&devices[0]).unwrap();
        assert_eq!(ledger.live_references(9), 2);

        drop(devices);
        assert_eq!(ledger.live_references(9), 1);

        drop(candidate);
        assert_eq!(ledger.live_references(9), 0);
    }

    // ------------------------------------------------------------------------
    // Properties over generated descriptor trees
    // ------------------------------------------------------------------------

    use crate::usb::Endpoint;
    use proptest::prelude::*;

    fn address() -> impl Strategy<Value = u8> {
        prop_oneof![1 => Just(0u8), 7 => 1..=u8::MAX]
    }

    fn endpoint() -> impl Strategy<Value = Endpoint> {
        let direction = prop_oneof![Just(Direction::In), Just(Direction::Out)];
        let transfer_type = prop_oneof![
            Just(TransferType::Control),
            Just(TransferType::Isochronous),
            Just(TransferType::Bulk),
            Just(TransferType::Interrupt),
        ];
        (address(), direction, transfer_type)
            .prop_map(|(address, direction, transfer_type)| {
                Endpoint::new(address, direction, transfer_type)
            })
    }

    /// The three MTP roles in random order, addresses possibly zero
    fn mtp_triple() -> impl Strategy<Value = Vec<Endpoint>> {
        (address(), address(), address())
            .prop_map(|(event, fetch, send)| {
                vec![interrupt_in(event), bulk_in(fetch), bulk_out(send)]
            })
            .prop_shuffle()
    }

    /// Endpoint lists of 0 to 5 entries, biased towards the MTP shape
    fn endpoint_list() -> impl Strategy<Value = Vec<Endpoint>> {
        let triple_plus_one = (mtp_triple(), endpoint())
            .prop_map(|(mut endpoints, extra)| {
                endpoints.push(extra);
                endpoints
            })
            .prop_shuffle();

        prop_oneof![
            2 => prop::collection::vec(endpoint(), 0..=5),
            2 => mtp_triple(),
            1 => triple_plus_one,
        ]
    }

    /// Configurations -> interfaces -> alternate settings -> endpoints
    fn descriptor_tree() -> impl Strategy<Value = Vec<Vec<Vec<Vec<Endpoint>>>>> {
        prop::collection::vec(
            prop::collection::vec(prop::collection::vec(endpoint_list(), 0..=3), 0..=3),
            0..=3,
        )
    }

    fn is_mtp_shape(endpoints: &[Endpoint]) -> bool {
        let count = |direction: Direction, transfer_type: TransferType| {
            endpoints
                .iter()
                .filter(|ep| ep.direction == direction && ep.transfer_type == transfer_type)
                .count()
        };

        endpoints.len() == 3
            && count(Direction::In, TransferType::Interrupt) == 1
            && count(Direction::In, TransferType::Bulk) == 1
            && count(Direction::Out, TransferType::Bulk) == 1
            && endpoints.iter().all(|ep| ep.address != 0)
    }

    proptest! {
        #[test]
        fn test_classify_recognizes_exactly_the_triple(endpoints in endpoint_list()) {
            let classified = classify_endpoints(&alt_setting(0, 0, endpoints.clone()));

            prop_assert_eq!(classified.is_some(), is_mtp_shape(&endpoints));
            if let Some(found) = classified {
                prop_assert!(endpoints.contains(&interrupt_in(found.event)));
                prop_assert!(endpoints.contains(&bulk_in(found.fetch)));
                prop_assert!(endpoints.contains(&bulk_out(found.send)));
            }
        }

        #[test]
        fn test_scan_picks_first_matching_alt_setting(tree in descriptor_tree()) {
            let configs: Vec<_> = tree
                .iter()
                .enumerate()
                .map(|(c, interfaces)| {
                    let interfaces = interfaces
                        .iter()
                        .enumerate()
                        .map(|(i, alts)| {
                            alts.iter()
                                .enumerate()
                                .map(|(a, endpoints)| alt_setting(i as u8, a as u8, endpoints.clone()))
                                .collect()
                        })
                        .collect();
                    config(c as u8 + 1, interfaces)
                })
                .collect();

            let expected = tree.iter().enumerate().find_map(|(c, interfaces)| {
                interfaces.iter().enumerate().find_map(|(i, alts)| {
                    alts.iter()
                        .position(|endpoints| is_mtp_shape(endpoints))
                        .map(|a| (c as u8 + 1, i as u8, a as u8))
                })
            });

            let bus = MockBus::new(vec![MockDeviceSpec::mtp(1).with_configs(configs)]);
            let devices = bus.devices().unwrap();
            let found = scan_device(&devices[0]).map(|candidate| {
                (
                    candidate.config_value(),
                    candidate.interface().interface_number,
                    candidate.interface().setting_number,
                )
            });

            prop_assert_eq!(found, expected);
        }
    }
}
