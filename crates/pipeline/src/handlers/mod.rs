mod diff;
mod ignore_events;
mod log;
mod notify;

pub use diff::DiffHandler;
pub use ignore_events::IgnoreEventsHandler;
pub use log::LogHandler;
pub use notify::{colour, truncate_chars, NotifyHandler, MAX_TEXT_CHARS};

use vigil_core::EventKind;

fn is_ignored(ignore: &[String], kind: EventKind) -> bool {
    ignore.iter().any(|name| kind.matches(name))
}
