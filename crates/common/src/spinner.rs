use std::time::Instant;

use cliclack::ProgressBar;

/// Terminal spinner that reports how long the wrapped step took.
pub struct Spinner {
    msg: String,
    pb: ProgressBar,
    time: Instant,
}

impl Spinner {
    pub fn new(msg: &str) -> Self {
        let pb = cliclack::spinner();
        pb.start(msg);
        Spinner {
            msg: msg.to_owned(),
            pb,
            time: Instant::now(),
        }
    }

    pub fn finish(self) {
        self.pb.stop(format!(
            "{} done in {:.2} secs",
            self.msg,
            self.time.elapsed().as_secs_f64()
        ));
    }

    pub fn fail(self) {
        self.pb.error(format!(
            "{} failed after {:.2} secs",
            self.msg,
            self.time.elapsed().as_secs_f64()
        ));
    }
}
