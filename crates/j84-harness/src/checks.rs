//! Checks shared by many steps. Each returns the failure messages to record,
//! already prefixed with the caller's citation.

use std::collections::BTreeSet;

use j84_canbus::DecodeFailure;
use j84_canbus::TypedPacket;
use j84_canbus::addresses::address_name;
use j84_canbus::packets::AcknowledgmentPacket;

/// Compare each destination-specific packet with the global response from
/// the same module. Content is compared without receive timestamps.
///
/// One failure per module whose DS packet differs from, or has no, global
/// counterpart. Modules that only answered globally are not judged here.
pub fn compare_request_packets<T: TypedPacket>(global: &[T], ds: &[T], citation: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut failures = Vec::new();
    for ds_packet in ds {
        let source = ds_packet.source();
        if !seen.insert(source) {
            continue;
        }
        let matches = global
            .iter()
            .find(|g| g.source() == source)
            .is_some_and(|g| g.packet().same_content(ds_packet.packet()));
        if !matches {
            failures.push(format!(
                "{citation} - Difference compared to data received during global request from {}",
                address_name(source)
            ));
        }
    }
    failures
}

/// Every expected module absent from the global response must have NACKed
/// the DS request. ACK, Busy and Access Denied do not count.
pub fn check_for_nacks<T: TypedPacket>(
    global: &[T],
    ds_acks: &[AcknowledgmentPacket],
    addresses: &[u8],
    citation: &str,
) -> Vec<String> {
    missing_nacks(global, ds_acks, addresses)
        .map(|address| {
            format!(
                "{citation} - OBD module {} did not provide a response to Global query and did not provide a NACK for the DS query",
                address_name(address)
            )
        })
        .collect()
}

/// Like [`check_for_nacks`] for steps that only make DS requests.
pub fn check_for_nacks_ds<T: TypedPacket>(
    ds_packets: &[T],
    ds_acks: &[AcknowledgmentPacket],
    addresses: &[u8],
    citation: &str,
) -> Vec<String> {
    missing_nacks(ds_packets, ds_acks, addresses)
        .map(|address| {
            format!(
                "{citation} - OBD module {} did not provide a response to DS query and did not provide a NACK for the DS query",
                address_name(address)
            )
        })
        .collect()
}

fn missing_nacks<'a, T: TypedPacket>(
    packets: &'a [T],
    acks: &'a [AcknowledgmentPacket],
    addresses: &'a [u8],
) -> impl Iterator<Item = u8> + 'a {
    let expected: BTreeSet<u8> = addresses.iter().copied().collect();
    expected.into_iter().filter(move |&address| {
        let responded = packets.iter().any(|p| p.source() == address);
        let nacked = acks.iter().any(|a| a.source() == address && a.is_nack());
        !responded && !nacked
    })
}

/// One failure per response that could not be decoded.
pub fn decode_failures(failures: &[DecodeFailure], citation: &str) -> Vec<String> {
    failures
        .iter()
        .map(|f| {
            format!(
                "{citation} - Decode error in PGN {} from {}: {}",
                f.pgn,
                address_name(f.source),
                f.error
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use j84_canbus::DecodeError;
    use j84_canbus::packets::{AckResponse, Dm2};
    use j84_canbus::types::{DEFAULT_TOOL_ADDRESS, PGN_DM2};
    use j84_protocol::{DiagnosticTroubleCode, LampStatus};

    const OFF: LampStatus = LampStatus::Off;

    fn dm2(source: u8, mil: LampStatus) -> Dm2 {
        Dm2::create(source, mil, OFF, OFF, OFF, &[]).unwrap()
    }

    fn ack(source: u8, response: AckResponse) -> AcknowledgmentPacket {
        AcknowledgmentPacket::create(source, response, PGN_DM2, DEFAULT_TOOL_ADDRESS).unwrap()
    }

    #[test]
    fn identical_packets_do_not_differ() {
        let global = vec![dm2(0, OFF), dm2(1, OFF)];
        // Same content, fresh timestamps.
        let ds = vec![dm2(0, OFF), dm2(1, OFF)];
        assert!(compare_request_packets(&global, &ds, "6.3.7.4.a").is_empty());
        assert!(compare_request_packets(&global, &global, "6.3.7.4.a").is_empty());
    }

    #[test]
    fn one_failure_per_changed_module() {
        let global = vec![dm2(0, OFF), dm2(1, OFF), dm2(2, OFF)];
        let dtc = DiagnosticTroubleCode::new(123, 12, 1, 0);
        let ds = vec![
            dm2(0, LampStatus::On),
            dm2(1, OFF),
            Dm2::create(2, OFF, OFF, OFF, OFF, &[dtc]).unwrap(),
            dm2(0, LampStatus::On),
        ];
        let failures = compare_request_packets(&global, &ds, "6.3.7.4.a");
        assert_eq!(
            failures,
            vec![
                "6.3.7.4.a - Difference compared to data received during global request from Engine #1 (0)",
                "6.3.7.4.a - Difference compared to data received during global request from Turbocharger (2)",
            ]
        );
    }

    #[test]
    fn ds_without_global_counterpart_differs() {
        let failures = compare_request_packets(&[], &[dm2(1, OFF)], "6.1.11.4.e");
        assert_eq!(failures.len(), 1);
        assert!(failures[0].ends_with("Engine #2 (1)"));
    }

    #[test]
    fn global_only_modules_are_not_compared() {
        assert!(compare_request_packets(&[dm2(0, OFF)], &[], "6.3.7.4.a").is_empty());
    }

    #[test]
    fn nack_satisfies_missing_global_response() {
        let global = vec![dm2(0, OFF)];
        let acks = vec![ack(1, AckResponse::Nack)];
        assert!(check_for_nacks(&global, &acks, &[0, 1], "6.3.7.4.b").is_empty());
    }

    #[test]
    fn missing_nack_fails() {
        let failures = check_for_nacks(&[dm2(0, OFF)], &[], &[0, 1], "6.3.7.4.b");
        assert_eq!(
            failures,
            vec![
                "6.3.7.4.b - OBD module Engine #2 (1) did not provide a response to Global query and did not provide a NACK for the DS query"
            ]
        );
    }

    #[test]
    fn other_acknowledgments_do_not_satisfy() {
        let acks = vec![
            ack(1, AckResponse::Ack),
            ack(2, AckResponse::Busy),
            ack(3, AckResponse::Denied),
            ack(4, AckResponse::Nack),
        ];
        let failures = check_for_nacks::<Dm2>(&[], &acks, &[1, 2, 3, 4], "6.3.7.4.b");
        assert_eq!(failures.len(), 3);
        assert!(failures.iter().all(|f| !f.contains("(4)")));
    }

    #[test]
    fn nack_from_other_module_does_not_count() {
        let failures = check_for_nacks::<Dm2>(&[], &[ack(2, AckResponse::Nack)], &[1], "x");
        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn exactly_one_failure_per_address() {
        // Every subset of three modules answered, NACKed, or stayed silent.
        for mask in 0u32..27 {
            let mut global = Vec::new();
            let mut acks = Vec::new();
            let mut expected = 0;
            let mut m = mask;
            for address in 0u8..3 {
                match m % 3 {
                    0 => global.push(dm2(address, OFF)),
                    1 => acks.push(ack(address, AckResponse::Nack)),
                    _ => expected += 1,
                }
                m /= 3;
            }
            let failures = check_for_nacks(&global, &acks, &[0, 1, 2, 2], "c");
            assert_eq!(failures.len(), expected, "mask {mask}");
        }
    }

    #[test]
    fn ds_variant_message() {
        let failures = check_for_nacks_ds::<Dm2>(&[], &[], &[0], "6.11.11.2.b");
        assert_eq!(
            failures,
            vec![
                "6.11.11.2.b - OBD module Engine #1 (0) did not provide a response to DS query and did not provide a NACK for the DS query"
            ]
        );
    }

    #[test]
    fn decode_failure_messages() {
        let failures = decode_failures(
            &[DecodeFailure {
                source: 0,
                pgn: 49408,
                error: DecodeError::TooShort {
                    pgn: 49408,
                    needed: 8,
                    actual: 4,
                },
            }],
            "6.1.11.1.a",
        );
        assert_eq!(failures.len(), 1);
        assert!(failures[0].starts_with("6.1.11.1.a - Decode error in PGN 49408 from Engine #1 (0): "));
    }
}
