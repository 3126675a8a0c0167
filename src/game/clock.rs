//! The 1 Hz game clock.
//!
//! The coordinator's select loop polls its interval only while proposals are
//! being collected, so no second is ever charged during lobby, finalization
//! or after the game ends. The low-time bonus is applied at commit time by
//! the turn controller, never here.

use shared::EndReason;
use tracing::info;

use crate::game::actor::Coordinator;

impl Coordinator {
    /// One second elapsed with the game awaiting proposals.
    pub(crate) fn clock_tick(&mut self) {
        let side = self.game.side_to_move();
        let remaining = self.game.clock.tick(side);
        self.broadcast(self.clock_message());

        if remaining == 0 {
            info!(%side, "flag fell");
            self.end_game(EndReason::Timeout, Some(side.opponent()));
        }
    }
}
