pub mod agenda;
pub mod meeting;
pub mod question;
pub mod transcript;

pub use agenda::{AgendaNode, AgendaStatus, TimeRange};
pub use meeting::Meeting;
pub use question::AgendaQuestion;
pub use transcript::{Transcript, TranscriptSegment};
