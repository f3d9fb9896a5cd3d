//! 6.1.3 DM5 Diagnostic Readiness 1: find the OBD modules.

use std::collections::BTreeSet;

use async_trait::async_trait;

use j84_canbus::TypedPacket;
use j84_canbus::packets::{Dm5, obd_compliance_name};

use crate::error::RunResult;
use crate::step::{Step, StepContext, StepInfo};

pub struct ObdDiscovery;

#[async_trait]
impl Step for ObdDiscovery {
    fn info(&self) -> StepInfo {
        StepInfo {
            part: 1,
            step: 3,
            total_sub_steps: 1,
            name: "DM5 Diagnostic Readiness 1",
        }
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> RunResult<()> {
        ctx.increment_progress("Part 1, Step 3 a - Requesting DM5 from all modules");
        let response = ctx.request_global::<Dm5>().await?;
        ctx.report_decode_errors(&response.decode_errors, "6.1.3.2.a");

        for dm5 in &response.packets {
            if dm5.is_obd() {
                ctx.repository_mut().put_obd_module(dm5.source()).update_from_dm5(dm5);
            }
            ctx.save(dm5);
        }

        let addresses = ctx.obd_module_addresses();
        if addresses.is_empty() {
            ctx.add_failure("6.1.3.2.b - No OBD ECU claimed OBD compliance in DM5");
            return Ok(());
        }

        let compliance: BTreeSet<u8> = response
            .packets
            .iter()
            .filter(|p| p.is_obd())
            .map(Dm5::obd_compliance)
            .collect();
        if compliance.len() > 1 {
            ctx.add_warning(
                "6.1.3.3.a - An ECU responded with a value for OBD Compliance that was not identical to other ECUs",
            );
        }

        for address in addresses {
            let Some(value) = ctx.repository().obd_module(address).and_then(|m| m.obd_compliance) else {
                continue;
            };
            let line = format!("{} reported {}", ctx.module_name(address), obd_compliance_name(value));
            ctx.add_info(&line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::StepHarness;
    use j84_canbus::packets::NOT_INTENDED_FOR_OBD;
    use j84_canbus::types::{GLOBAL_ADDRESS, PGN_DM5};
    use j84_protocol::Outcome;

    fn dm5(source: u8, compliance: u8) -> j84_canbus::CanFrame {
        Dm5::create(source, 0, 0, compliance).unwrap().packet().to_frame()
    }

    #[tokio::test(start_paused = true)]
    async fn records_obd_modules() {
        let mut h = StepHarness::new();
        h.mock.respond_to(
            PGN_DM5,
            GLOBAL_ADDRESS,
            vec![dm5(0, 0x13), dm5(0x17, NOT_INTENDED_FOR_OBD), dm5(0x3D, 0x13)],
        );
        h.run(&ObdDiscovery).await.unwrap();

        assert_eq!(h.repo.obd_module_addresses(), vec![0, 0x3D]);
        assert_eq!(h.repo.obd_module(0).unwrap().obd_compliance, Some(0x13));
        // Non-OBD responses are still kept.
        assert!(h.repo.get::<Dm5>(0x17).is_some());
        assert!(h.listener.outcomes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn no_obd_module_fails() {
        let mut h = StepHarness::new();
        h.mock.respond_to(PGN_DM5, GLOBAL_ADDRESS, vec![dm5(0, NOT_INTENDED_FOR_OBD)]);
        h.run(&ObdDiscovery).await.unwrap();

        assert_eq!(
            h.listener.results(),
            "FAIL: 6.1.3.2.b - No OBD ECU claimed OBD compliance in DM5\n"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_bus_fails() {
        let mut h = StepHarness::new();
        h.run(&ObdDiscovery).await.unwrap();
        assert_eq!(h.listener.outcomes().len(), 1);
        assert_eq!(h.repo.step_result(1, 3).unwrap().outcome(), Outcome::Fail);
    }

    #[tokio::test(start_paused = true)]
    async fn mixed_compliance_warns() {
        let mut h = StepHarness::new();
        h.mock.respond_to(PGN_DM5, GLOBAL_ADDRESS, vec![dm5(0, 0x13), dm5(1, 0x14)]);
        h.run(&ObdDiscovery).await.unwrap();

        let outcomes = h.listener.outcomes();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome, Outcome::Warn);
        assert!(outcomes[0].message.starts_with("6.1.3.3.a - "));
    }
}
