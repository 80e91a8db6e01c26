use routerctl_common::logger;
use tokio::sync::watch;

use crate::messages::MSG_STOP_REQUESTED;

pub mod args;
pub mod deploy;
pub mod reconcile;
pub mod status;

/// Stop signal raised on Ctrl-C. Running routes finish their current action.
fn stop_on_ctrl_c() -> watch::Receiver<bool> {
    let (stop_sender, stop_receiver) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            logger::warn(MSG_STOP_REQUESTED);
            stop_sender.send_replace(true);
        }
    });
    stop_receiver
}
