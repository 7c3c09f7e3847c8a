//! CLI command implementations

pub mod attach;
pub mod flush;
pub mod format;
pub mod list;
pub mod register;
pub mod stop;
pub mod tune;

pub use attach::{attach, detach};
pub use flush::execute as flush;
pub use format::{format, superblock};
pub use list::{list, show};
pub use register::{register, unregister};
pub use stop::execute as stop;
pub use tune::{print_tunables, tune};

use crate::error::{BcacheError, BcacheResult};
use crate::ui::{self, UiContext};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Cancellation token tripped by Ctrl-C while the guard lives
struct Interrupt {
    token: CancellationToken,
    listener: JoinHandle<()>,
}

impl Interrupt {
    fn listen() -> Self {
        let token = CancellationToken::new();
        let listener = {
            let token = token.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, no longer waiting for the kernel");
                    token.cancel();
                }
            })
        };
        Self { token, listener }
    }

    fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Interrupt {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

/// Print rendered output, ending with exactly one newline
fn emit(text: &str) {
    println!("{}", text.trim_end_matches('\n'));
}

/// Collapse per-device results of a multi-device command.
///
/// A single failure is returned as-is so its hint survives.
fn settle(ctx: &UiContext, verb: &str, mut failures: Vec<(String, BcacheError)>) -> BcacheResult<()> {
    match failures.len() {
        0 => Ok(()),
        1 => Err(failures.remove(0).1),
        n => {
            for (device, error) in &failures {
                ui::step_error_detail(ctx, device, &error.to_string());
            }
            Err(BcacheError::User(format!("Failed to {} {} device(s)", verb, n)))
        }
    }
}
