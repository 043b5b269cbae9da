use livepatch_proto::Patch;

/// Observer notifications published after each successful command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
	/// A diff was computed.
	Diff {
		/// Document uri.
		uri: String,
		/// Computed patches.
		patches: Vec<Patch>,
	},
	/// A patch set was applied.
	Patch {
		/// Document uri.
		uri: String,
		/// Patched content.
		content: String,
	},
	/// A baseline was registered.
	InitialContent {
		/// Document uri.
		uri: String,
	},
}

impl WorkerEvent {
	/// Document the event concerns.
	pub fn uri(&self) -> &str {
		match self {
			Self::Diff { uri, .. } | Self::Patch { uri, .. } | Self::InitialContent { uri } => uri,
		}
	}
}
