//! 6.11.11 DM26 Diagnostic Readiness 3: time since engine start must track
//! wall-clock time since the previous DM26.

use async_trait::async_trait;

use j84_canbus::TypedPacket;
use j84_canbus::packets::Dm26;

use crate::error::RunResult;
use crate::step::{Step, StepContext, StepInfo};

/// Allowed drift between the reported and the measured elapsed time.
const TOLERANCE_SECONDS: f64 = 10.0;

pub struct Dm26TripReadiness;

#[async_trait]
impl Step for Dm26TripReadiness {
    fn info(&self) -> StepInfo {
        StepInfo {
            part: 11,
            step: 11,
            total_sub_steps: 1,
            name: "DM26 Diagnostic Readiness 3",
        }
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> RunResult<()> {
        ctx.increment_progress("Part 11, Step 11 a - Requesting DM26 from each OBD module");
        let addresses = ctx.obd_module_addresses();
        let ds = ctx.request_ds_each::<Dm26>(&addresses).await?;
        ctx.report_decode_errors(&ds.decode_errors, "6.11.11.2");

        for packet in &ds.packets {
            let consistent = ctx
                .get::<Dm26>(packet.source())
                .is_some_and(|previous| tracks_elapsed_time(previous, packet));
            if !consistent {
                ctx.add_failure(format!(
                    "6.11.11.2.a - {} reported time since engine start differs by more than ±10 seconds from expected value",
                    packet.module_name()
                ));
            }
        }

        ctx.check_for_nacks_ds(&ds.packets, &ds.acks, "6.11.11.2.b");

        for packet in &ds.packets {
            ctx.save(packet);
        }
        Ok(())
    }
}

/// The growth in SPN 3301 matches the time between the two receptions.
fn tracks_elapsed_time(previous: &Dm26, current: &Dm26) -> bool {
    let (Some(before), Some(after)) = (
        previous.time_since_engine_start().value(),
        current.time_since_engine_start().value(),
    ) else {
        return false;
    };
    let elapsed = current.packet().timestamp() - previous.packet().timestamp();
    let elapsed = elapsed.num_milliseconds() as f64 / 1000.0;
    ((after - before) - elapsed).abs() <= TOLERANCE_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::{StepHarness, TOOL};
    use j84_canbus::packets::{AckResponse, AcknowledgmentPacket};
    use j84_canbus::types::PGN_DM26;
    use j84_canbus::{Clock, SpnValue};

    fn dm26(source: u8, seconds: SpnValue) -> Dm26 {
        Dm26::create(source, seconds, 0).unwrap()
    }

    /// Store a DM26 received `ago` seconds before the harness clock.
    fn previous(h: &mut StepHarness, source: u8, seconds: f64, ago: i64) {
        let received = h.clock.now() - chrono::Duration::seconds(ago);
        let packet = dm26(source, SpnValue::Value(seconds)).packet().clone().with_timestamp(received);
        h.repo.save(&Dm26::decode(packet).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn consistent_time_passes() {
        let mut h = StepHarness::with_obd_modules(&[0]);
        previous(&mut h, 0, 100.0, 120);
        h.mock
            .respond_to(PGN_DM26, 0, vec![dm26(0, SpnValue::Value(225.0)).packet().to_frame()]);
        h.run(&Dm26TripReadiness).await.unwrap();

        assert_eq!(h.listener.results(), "");
        let saved = h.repo.get::<Dm26>(0).unwrap();
        assert_eq!(saved.time_since_engine_start(), SpnValue::Value(225.0));
    }

    #[tokio::test(start_paused = true)]
    async fn drift_beyond_tolerance_fails() {
        let mut h = StepHarness::with_obd_modules(&[0]);
        previous(&mut h, 0, 100.0, 120);
        h.mock
            .respond_to(PGN_DM26, 0, vec![dm26(0, SpnValue::Value(160.0)).packet().to_frame()]);
        h.run(&Dm26TripReadiness).await.unwrap();

        assert_eq!(
            h.listener.results(),
            "FAIL: 6.11.11.2.a - Engine #1 (0) reported time since engine start differs by more than ±10 seconds from expected value\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn missing_previous_packet_fails() {
        let mut h = StepHarness::with_obd_modules(&[0]);
        h.mock
            .respond_to(PGN_DM26, 0, vec![dm26(0, SpnValue::Value(30.0)).packet().to_frame()]);
        h.run(&Dm26TripReadiness).await.unwrap();
        assert_eq!(h.listener.outcomes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unavailable_time_fails() {
        let mut h = StepHarness::with_obd_modules(&[0]);
        previous(&mut h, 0, 100.0, 120);
        h.mock
            .respond_to(PGN_DM26, 0, vec![dm26(0, SpnValue::NotAvailable).packet().to_frame()]);
        h.run(&Dm26TripReadiness).await.unwrap();
        assert_eq!(h.listener.outcomes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_module_without_nack_fails() {
        let mut h = StepHarness::with_obd_modules(&[0, 1]);
        previous(&mut h, 0, 100.0, 120);
        let nack = AcknowledgmentPacket::create(1, AckResponse::Nack, PGN_DM26, TOOL).unwrap();
        h.mock.respond_to(PGN_DM26, 1, vec![nack.packet().to_frame()]);
        h.run(&Dm26TripReadiness).await.unwrap();

        assert_eq!(
            h.listener.results(),
            "FAIL: 6.11.11.2.b - OBD module Engine #1 (0) did not provide a response to DS query and did not provide a NACK for the DS query\n"
        );
        // The stale packet is kept.
        assert_eq!(
            h.repo.get::<Dm26>(0).unwrap().time_since_engine_start(),
            SpnValue::Value(100.0)
        );
    }
}
