use std::path::PathBuf;

/// One CLI action, independent of how arguments were parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// The fixed query sequence; seeds the collection first when it is empty.
    Run {
        seed_file: Option<PathBuf>,
    },
    Seed {
        file: Option<PathBuf>,
        reset: bool,
    },
    Find {
        filter_json: Option<String>,
        project: Option<String>,
        sort: Option<String>,
        skip: Option<usize>,
        limit: Option<usize>,
    },
    UpdateOne {
        filter_json: String,
        update_json: String,
    },
    DeleteOne {
        filter_json: String,
    },
    Aggregate {
        pipeline_json: String,
    },
    CreateIndex {
        keys_json: String,
    },
    Indexes,
    Explain {
        filter_json: String,
    },
}

impl Command {
    /// Whether the command changes stored state and must be flushed afterwards.
    #[must_use]
    pub const fn mutates(&self) -> bool {
        matches!(
            self,
            Self::Run { .. } | Self::Seed { .. } | Self::UpdateOne { .. } | Self::DeleteOne { .. } | Self::CreateIndex { .. }
        )
    }
}
