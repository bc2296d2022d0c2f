use std::fmt::Display;
use std::path::Path;

/// Emits the user-visible progress lines of an indexing run.
///
/// Lines are formatted `{project} - {message} ({pct:.1}%)` where the
/// percentage is `count` over the number of new tags of the run. The project
/// name is the directory containing the data directory, following the usual
/// `<projects>/<project>/data` layout.
#[derive(Debug, Clone)]
pub struct Progress {
    project: String,
    num_tags: usize,
}

impl Progress {
    pub fn new(data_dir: &Path, num_tags: usize) -> Progress {
        let project = data_dir
            .parent()
            .and_then(Path::file_name)
            .or_else(|| data_dir.file_name())
            .map_or_else(|| String::from("?"), |name| name.to_string_lossy().into_owned());
        Progress { project, num_tags }
    }

    pub fn report(&self, message: impl Display, count: usize) {
        let pct = if self.num_tags == 0 {
            100.0
        } else {
            count as f64 * 100.0 / self.num_tags as f64
        };
        tracing::info!("{} - {} ({:.1}%)", self.project, message, pct);
    }
}
