use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::Poll;

use crate::model::ProfileGroup;
use crate::parsers::{ImportError, import_profile_group};

/// Frames demangled per step.
pub const DEMANGLE_CHUNK: usize = 512;

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How an import ended.
#[derive(Debug)]
pub enum ImportOutcome {
    Loaded(ProfileGroup),
    /// Not a profile format. The bytes are handed back so the caller can
    /// try them as something else, e.g. a symbol map.
    Unrecognized { file_name: String, bytes: Vec<u8> },
    /// Recognized, but holds no profiles.
    Empty,
    Failed(ImportError),
    Cancelled,
}

enum Phase {
    Parse { bytes: Vec<u8> },
    Demangle {
        group: ProfileGroup,
        /// First profile of each distinct frame table.
        owners: Vec<usize>,
        table: usize,
        next_frame: usize,
    },
    Done,
}

/// An import split into bounded steps so the UI keeps drawing while it
/// runs: parse, then demangle frame names chunk by chunk.
pub struct ImportTask {
    file_name: String,
    token: CancellationToken,
    phase: Phase,
}

impl ImportTask {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>, token: CancellationToken) -> Self {
        Self {
            file_name: file_name.into(),
            token,
            phase: Phase::Parse { bytes },
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Run one phase. A cancelled or finished task yields
    /// [`ImportOutcome::Cancelled`] and never hands out a group.
    pub fn step(&mut self) -> Poll<ImportOutcome> {
        if self.token.is_cancelled() {
            self.phase = Phase::Done;
            log::debug!("import of {} cancelled", self.file_name);
            return Poll::Ready(ImportOutcome::Cancelled);
        }

        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::Parse { bytes } => match import_profile_group(&self.file_name, &bytes) {
                Ok(Some(group)) if group.is_empty() => Poll::Ready(ImportOutcome::Empty),
                Ok(Some(group)) => {
                    log::debug!("parsed {}, demangling", self.file_name);
                    self.phase = Phase::Demangle {
                        owners: group.frame_table_owners(),
                        group,
                        table: 0,
                        next_frame: 0,
                    };
                    Poll::Pending
                }
                Ok(None) => Poll::Ready(ImportOutcome::Unrecognized {
                    file_name: self.file_name.clone(),
                    bytes,
                }),
                Err(err) => Poll::Ready(ImportOutcome::Failed(err)),
            },
            Phase::Demangle {
                mut group,
                owners,
                table,
                next_frame,
            } => {
                let Some(&owner) = owners.get(table) else {
                    return Poll::Ready(ImportOutcome::Loaded(group));
                };
                let end = next_frame + DEMANGLE_CHUNK;
                let renamed = group.demangle_frames(owner, next_frame..end);
                if renamed > 0 {
                    log::debug!("demangled {renamed} frame(s) of frame table {table}");
                }
                let (table, next_frame) = if end < group.profiles[owner].frames().len() {
                    (table, end)
                } else {
                    (table + 1, 0)
                };
                self.phase = Phase::Demangle {
                    group,
                    owners,
                    table,
                    next_frame,
                };
                Poll::Pending
            }
            Phase::Done => Poll::Ready(ImportOutcome::Cancelled),
        }
    }

    /// Step until the task finishes.
    pub fn run_to_completion(mut self) -> ImportOutcome {
        loop {
            if let Poll::Ready(outcome) = self.step() {
                return outcome;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, bytes: &[u8]) -> ImportTask {
        ImportTask::new(name, bytes.to_vec(), CancellationToken::new())
    }

    #[test]
    fn loads_and_demangles_in_steps() {
        let mut text = String::new();
        for i in 0..(DEMANGLE_CHUNK + 10) {
            text.push_str(&format!("main;f{i} 1\n"));
        }
        text.push_str("main;_ZN3foo3barE 1\n");
        let mut t = task("big.txt", text.as_bytes());

        let mut steps = 0;
        let outcome = loop {
            steps += 1;
            if let Poll::Ready(outcome) = t.step() {
                break outcome;
            }
        };
        // parse, two chunks, finish
        assert_eq!(steps, 4);
        let ImportOutcome::Loaded(group) = outcome else {
            panic!("expected a loaded group");
        };
        let names: Vec<&str> = group.profiles[0]
            .frames()
            .iter()
            .map(|(_, f)| f.name.as_str())
            .collect();
        assert!(names.contains(&"foo::bar"));
    }

    #[test]
    fn profiles_keep_sharing_frames_after_import() {
        let json = br#"{
            "$schema": "https://www.speedscope.app/file-format-schema.json",
            "shared": {"frames": [{"name": "main"}, {"name": "_ZN3foo3barE"}]},
            "profiles": [
                {"type": "sampled", "name": "one", "unit": "none", "startValue": 0,
                 "endValue": 2, "samples": [[0, 1]], "weights": [2]},
                {"type": "sampled", "name": "two", "unit": "none", "startValue": 0,
                 "endValue": 3, "samples": [[0, 1], [0]], "weights": [2, 1]}
            ]
        }"#;
        let ImportOutcome::Loaded(group) = task("shared.json", json).run_to_completion() else {
            panic!("expected a loaded group");
        };
        assert_eq!(group.len(), 2);
        assert!(Arc::ptr_eq(
            &group.profiles[0].shared_frames(),
            &group.profiles[1].shared_frames()
        ));
        let names: Vec<&str> = group.profiles[1]
            .frames()
            .iter()
            .map(|(_, f)| f.name.as_str())
            .collect();
        assert!(names.contains(&"foo::bar"));
    }

    #[test]
    fn cancellation_stops_before_commit() {
        let mut t = task("a.txt", b"a;b 1\n");
        assert!(t.step().is_pending());
        t.token().cancel();
        assert!(matches!(t.step(), Poll::Ready(ImportOutcome::Cancelled)));
        assert!(matches!(t.step(), Poll::Ready(ImportOutcome::Cancelled)));
    }

    #[test]
    fn unrecognized_hands_bytes_back() {
        let outcome = task("map.txt", b"0:main\n").run_to_completion();
        let ImportOutcome::Unrecognized { file_name, bytes } = outcome else {
            panic!("expected an unrecognized outcome");
        };
        assert_eq!(file_name, "map.txt");
        assert_eq!(bytes, b"0:main\n");
    }

    #[test]
    fn empty_and_failed_imports() {
        let empty = br#"{"shared": {"frames": []}, "profiles": []}"#;
        assert!(matches!(
            task("e.json", empty).run_to_completion(),
            ImportOutcome::Empty
        ));
        assert!(matches!(
            task("n.txt", b"a -1\n").run_to_completion(),
            ImportOutcome::Failed(_)
        ));
    }
}
