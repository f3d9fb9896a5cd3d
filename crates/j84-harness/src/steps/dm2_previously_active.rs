//! 6.3.7 DM2 Previously Active Diagnostic Trouble Codes.

use async_trait::async_trait;

use j84_canbus::TypedPacket;
use j84_canbus::packets::Dm2;
use j84_protocol::LampStatus;

use crate::error::RunResult;
use crate::step::{Step, StepContext, StepInfo};

pub struct Dm2PreviouslyActive;

#[async_trait]
impl Step for Dm2PreviouslyActive {
    fn info(&self) -> StepInfo {
        StepInfo {
            part: 3,
            step: 7,
            total_sub_steps: 2,
            name: "DM2 Previously Active Diagnostic Trouble Codes",
        }
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> RunResult<()> {
        ctx.increment_progress("Part 3, Step 7 a - Requesting DM2 from all modules");
        let global = ctx.request_global::<Dm2>().await?;
        ctx.report_decode_errors(&global.decode_errors, "6.3.7.2");

        let (obd, other): (Vec<&Dm2>, Vec<&Dm2>) = global
            .packets
            .iter()
            .partition(|p| ctx.repository().is_obd_module(p.source()));

        for packet in obd.iter().filter(|p| !p.dtcs().is_empty()) {
            ctx.add_failure(format!(
                "6.3.7.2.a - OBD ECU {} reported a previously active DTC",
                packet.module_name()
            ));
        }
        for packet in obd.iter().filter(|p| p.mil_status() != LampStatus::Off) {
            ctx.add_failure(format!("6.3.7.2.b - OBD ECU {} did not report MIL off", packet.module_name()));
        }
        for packet in other
            .iter()
            .filter(|p| !matches!(p.mil_status(), LampStatus::Off | LampStatus::NotSupported))
        {
            ctx.add_failure(format!(
                "6.3.7.2.c - Non-OBD ECU {} did not report MIL off or not supported",
                packet.module_name()
            ));
        }

        ctx.increment_progress("Part 3, Step 7 b - Requesting DM2 from each OBD module");
        let addresses = ctx.obd_module_addresses();
        let ds = ctx.request_ds_each::<Dm2>(&addresses).await?;
        ctx.report_decode_errors(&ds.decode_errors, "6.3.7.4");

        ctx.compare_request_packets(&global.packets, &ds.packets, "6.3.7.4.a");
        ctx.check_for_nacks(&global.packets, &ds.acks, &addresses, "6.3.7.4.b");

        for packet in global.packets.iter().chain(&ds.packets) {
            ctx.save(packet);
        }
        Ok(())
    }
}
