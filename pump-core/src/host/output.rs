//! src/host/output.rs
//! ============================================================================
//! Output surface used when no interactive display is attached.

use crate::controller::messages::BufferedMessage;
use crate::controller::traits::OutputSurface;

/// Always ready and never locked. Flushed messages go to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessOutput;

impl OutputSurface for HeadlessOutput {
    fn is_ready(&self) -> bool {
        true
    }

    fn show_messages(&self, messages: &[BufferedMessage]) {
        for message in messages {
            println!("{message}");
        }
    }
}
