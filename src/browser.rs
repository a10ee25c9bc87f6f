use std::thread;
use std::time::Duration;

pub trait Navigator: Send + Sync {
    fn navigate(&self, location: &str);
}

pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>);
}

/// Opens locations in the system browser.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserNavigator;

impl Navigator for BrowserNavigator {
    fn navigate(&self, location: &str) {
        if let Err(err) = webbrowser::open(location) {
            tracing::warn!(%location, error = %err, "failed to open browser");
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) {
        thread::spawn(move || {
            thread::sleep(delay);
            task();
        });
    }
}
