use std::error::Error;
use std::io::Write;

#[cfg_attr(test, mockall::automock)]
pub trait Listener: Send + Sync {
    fn warning(&self, s: String);
    fn info(&self, s: String);

    fn progress(&self, operation: &str, detail: String) {
        self.info(format!("{operation}: {detail}"));
    }

    #[allow(unused_parens)]
    fn error(&self, error: &(dyn Error + 'static)) {
        let mut out = std::io::stderr().lock();
        let _ = writeln!(out, "aept: error: {error}");
    }
}

pub struct NoOpListener;
impl Listener for NoOpListener {
    fn info(&self, _s: String) {}
    fn warning(&self, _s: String) {}
    fn progress(&self, _op: &str, _s: String) {}
}

pub struct StdErrListener {
    pub verbose: bool,
    pub quiet: bool,
}

impl Listener for StdErrListener {
    fn warning(&self, s: String) {
        if !self.quiet {
            eprintln!("aept: warning: {s}");
        }
    }

    fn info(&self, s: String) {
        if self.verbose {
            eprintln!("aept: {s}");
        }
    }

    fn progress(&self, operation: &str, detail: String) {
        if !self.quiet {
            eprintln!("{operation:>12} {detail}");
        }
    }

    fn error(&self, err: &(dyn Error + 'static)) {
        eprintln!("aept: error: {err}");
        let mut cause = err.source();
        let mut max_causes = 4;
        while let Some(err) = cause {
            max_causes -= 1;
            if max_causes == 0 {
                break;
            }
            eprintln!("  because: {err}");
            cause = err.source();
        }
    }
}
