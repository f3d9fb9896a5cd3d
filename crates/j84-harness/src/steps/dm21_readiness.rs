//! 6.1.11 DM21 Diagnostic Readiness 2: distance and time counters must be
//! cleared at the start of the test.

use async_trait::async_trait;

use j84_canbus::packets::Dm21;
use j84_canbus::{SpnValue, TypedPacket};

use crate::error::RunResult;
use crate::step::{Step, StepContext, StepInfo};

pub struct Dm21Readiness;

#[async_trait]
impl Step for Dm21Readiness {
    fn info(&self) -> StepInfo {
        StepInfo {
            part: 1,
            step: 11,
            total_sub_steps: 2,
            name: "DM21 Diagnostic Readiness 2",
        }
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> RunResult<()> {
        ctx.increment_progress("Part 1, Step 11 a - Requesting DM21 from all modules");
        let global = ctx.request_global::<Dm21>().await?;
        ctx.report_decode_errors(&global.decode_errors, "6.1.11.1");

        let obd = ctx.obd_module_addresses();
        if !global.packets.iter().any(|p| obd.contains(&p.source())) {
            ctx.add_failure("6.1.11.1.e - No OBD ECU provided a DM21 message");
        }
        evaluate(ctx, &global.packets, "6.1.11.1");

        ctx.increment_progress("Part 1, Step 11 b - Requesting DM21 from each OBD module");
        let ds = ctx.request_ds_each::<Dm21>(&obd).await?;
        ctx.report_decode_errors(&ds.decode_errors, "6.1.11.4");
        evaluate(ctx, &ds.packets, "6.1.11.4");

        ctx.compare_request_packets(&global.packets, &ds.packets, "6.1.11.4.e");
        ctx.check_for_nacks(&global.packets, &ds.acks, &obd, "6.1.11.4.f");

        for packet in global.packets.iter().chain(&ds.packets) {
            ctx.save(packet);
        }
        Ok(())
    }
}

fn is_not_zero(value: SpnValue) -> bool {
    value.value().is_some_and(|v| v != 0.0)
}

fn over_one_minute(value: SpnValue) -> bool {
    value.value().is_some_and(|v| v > 1.0)
}

/// Rule by rule, so all `.a` failures precede all `.b` failures.
fn evaluate(ctx: &mut StepContext<'_>, packets: &[Dm21], section: &str) {
    type Rule = (&'static str, fn(&Dm21) -> bool, &'static str);
    let rules: [Rule; 4] = [
        (
            "a",
            |p| is_not_zero(p.km_while_mil_on()),
            "reported distance with MIL on (SPN 3069) is not zero",
        ),
        (
            "b",
            |p| is_not_zero(p.km_since_dtcs_cleared()),
            "reported distance SCC (SPN 3294) is not zero",
        ),
        (
            "c",
            |p| is_not_zero(p.minutes_while_mil_on()),
            "reported time with MIL on (SPN 3295) is not zero",
        ),
        (
            "d",
            |p| over_one_minute(p.minutes_since_dtcs_cleared()),
            "reported time SCC (SPN 3296) > 1 minute",
        ),
    ];
    for (letter, violated, text) in rules {
        for packet in packets.iter().filter(|p| violated(p)) {
            ctx.add_failure(format!("{section}.{letter} - {} {text}", packet.module_name()));
        }
    }
}
