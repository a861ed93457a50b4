//! Progress reporting as a fan-out interface: operations talk to a single
//! sink, and any number of listeners may be attached behind it.

use std::io::Write;

use log::info;

/// Receives progress events from a long-running operation
pub trait Progress {
    fn set_title(&mut self, _title: &str) {}
    /// Overall progress: `so_far` of `total` units
    fn set_count(&mut self, _so_far: usize, _total: usize) {}
    /// A new item started
    fn add_item(&mut self, _item: &str) {}
    /// Progress within the current item
    fn set_item_count(&mut self, _so_far: usize, _total: usize) {}
    /// The named item finished
    fn item_done(&mut self, _item: &str) {}
    /// The whole operation finished
    fn done(&mut self) {}
}

/// Discards everything
#[derive(Default)]
pub struct SilentProgress;

impl Progress for SilentProgress {}

/// Forwards every event to all attached sinks
#[derive(Default)]
pub struct MultiProgress {
    sinks: Vec<Box<dyn Progress>>,
}

impl MultiProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, sink: Box<dyn Progress>) {
        self.sinks.push(sink);
    }
}

impl Progress for MultiProgress {
    fn set_title(&mut self, title: &str) {
        self.sinks.iter_mut().for_each(|s| s.set_title(title));
    }

    fn set_count(&mut self, so_far: usize, total: usize) {
        self.sinks.iter_mut().for_each(|s| s.set_count(so_far, total));
    }

    fn add_item(&mut self, item: &str) {
        self.sinks.iter_mut().for_each(|s| s.add_item(item));
    }

    fn set_item_count(&mut self, so_far: usize, total: usize) {
        self.sinks
            .iter_mut()
            .for_each(|s| s.set_item_count(so_far, total));
    }

    fn item_done(&mut self, item: &str) {
        self.sinks.iter_mut().for_each(|s| s.item_done(item));
    }

    fn done(&mut self) {
        self.sinks.iter_mut().for_each(|s| s.done());
    }
}

/// Renders progress to stderr when it is a terminal; stays quiet otherwise
/// so piped output remains clean
pub struct ConsoleProgress {
    interactive: bool,
    title: String,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self {
            interactive: atty::is(atty::Stream::Stderr),
            title: String::new(),
        }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for ConsoleProgress {
    fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
        info!("{}", title);
    }

    fn set_count(&mut self, so_far: usize, total: usize) {
        if self.interactive {
            let _ = write!(std::io::stderr(), "\r{}: {}/{}", self.title, so_far, total);
        }
    }

    fn add_item(&mut self, item: &str) {
        info!("{}: {}", self.title, item);
    }

    fn item_done(&mut self, item: &str) {
        info!("done: {}", item);
    }

    fn done(&mut self) {
        if self.interactive {
            let _ = writeln!(std::io::stderr());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    #[derive(Default)]
    struct Recording {
        events: Rc<RefCell<Vec<String>>>,
    }

    impl Progress for Recording {
        fn set_title(&mut self, title: &str) {
            self.events.borrow_mut().push(format!("title:{}", title));
        }

        fn item_done(&mut self, item: &str) {
            self.events.borrow_mut().push(format!("done:{}", item));
        }
    }

    #[test]
    fn multi_progress_fans_out() {
        let events_a = Rc::new(RefCell::new(Vec::new()));
        let events_b = Rc::new(RefCell::new(Vec::new()));

        let mut multi = MultiProgress::new();
        multi.attach(Box::new(Recording {
            events: Rc::clone(&events_a),
        }));
        multi.attach(Box::new(Recording {
            events: Rc::clone(&events_b),
        }));

        multi.set_title("Downloading");
        multi.item_done("jars/a.jar");

        let expected = vec!["title:Downloading".to_string(), "done:jars/a.jar".to_string()];
        assert_eq!(expected, *events_a.borrow());
        assert_eq!(expected, *events_b.borrow());
    }
}
