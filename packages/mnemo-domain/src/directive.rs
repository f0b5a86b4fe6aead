//! Action directives embedded at the start of generated text.

/// Marker that opens a save-note directive. Matched case-sensitively at offset 0 only.
pub const SAVE_NOTE_MARKER: &str = "ACTION_SAVE_NOTE:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionDirective {
	SaveNote { payload: String },
}
impl ActionDirective {
	pub fn payload(&self) -> &str {
		match self {
			Self::SaveNote { payload } => payload,
		}
	}
}

pub fn parse(generated: &str) -> Option<ActionDirective> {
	let rest = generated.strip_prefix(SAVE_NOTE_MARKER)?;

	Some(ActionDirective::SaveNote { payload: rest.trim().to_string() })
}
