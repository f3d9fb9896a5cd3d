//! 6.1.27 Part 1 to Part 2 transition.

use async_trait::async_trait;

use j84_protocol::Outcome;

use crate::control::Ending;
use crate::error::{RunResult, StepError};
use crate::listener::{Answer, MessageKind};
use crate::step::{Step, StepContext, StepInfo};

const IDLE_SECONDS: u64 = 60;

const TRANSITION_QUESTION: &str = concat!(
    "Ready to transition from Part 1 to Part 2 of the test\n",
    "a. Testing may be stopped for vehicles with failed tests and for vehicles with the MIL on ",
    "or a non-emissions related fault displayed in DM1.\n",
    "   Vehicles with the MIL on will fail subsequent tests.\n",
    "\n",
    "This vehicle has had failures and will likely fail subsequent tests.  Would you still like to continue?\n",
);

pub struct PartTransition;

#[async_trait]
impl Step for PartTransition {
    fn info(&self) -> StepInfo {
        StepInfo {
            part: 1,
            step: 27,
            total_sub_steps: 3,
            name: "Part 1 to Part 2 Transition",
        }
    }

    async fn run(&self, ctx: &mut StepContext<'_>) -> RunResult<()> {
        ctx.increment_progress("Part 1, Step 27 - Part 1 to Part 2 Transition");
        if part1_has_failures(ctx) {
            let answer = ctx
                .urgent(TRANSITION_QUESTION, "Start Part 2", MessageKind::Question)
                .await?;
            if answer == Answer::No {
                ctx.add_outcome(Outcome::Abort, "Aborting - user ended test");
                ctx.set_ending(Ending::Aborted);
                return Err(StepError::Interrupted(Ending::Aborted));
            }
        }

        ctx.increment_progress("Part 1, Step 27 b.i - Ensuring Key On, Engine On");
        ctx.ensure_key_on_engine_on().await?;

        ctx.increment_progress("Part 1, Step 27 b.iii - Allowing engine to idle one minute");
        ctx.on_result(&format!("Allowing engine to idle for {IDLE_SECONDS} seconds"));
        ctx.wait_for(IDLE_SECONDS, "Allowing engine to idle for").await
    }
}

fn part1_has_failures(ctx: &StepContext<'_>) -> bool {
    ctx.repository().part_result(ctx.part()).is_some_and(|part| {
        part.steps
            .iter()
            .filter(|s| s.step != ctx.step())
            .any(|s| s.has_outcome(Outcome::Fail))
    })
}
