//! Human-readable step labels derived from the registration site.
//!
//! Registration methods are `#[track_caller]`, so the location captured when
//! a step is registered is the test author's line, not the scheduler's. The
//! frames of the steps executing at that moment become the rest of the
//! step's origin chain and determine its indentation in diagnostics.

use std::panic::Location;
use std::path::{Path, PathBuf};

/// Placeholder file name for frames whose location could not be resolved.
const UNRESOLVED_FILE: &str = "<unknown>";

/// One frame of a step's origin: where it was registered and by which
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    /// Source file, as reported by the compiler
    pub file: String,
    /// 1-based line number
    pub line: u32,
    /// 1-based column number
    pub column: u32,
    /// Qualified name of the registering operation, e.g. `Scenario::given_events`
    pub function: String,
}

impl SourceLocation {
    /// Captures the location of the caller of the enclosing
    /// `#[track_caller]` function.
    #[track_caller]
    pub fn caller(function: impl Into<String>) -> Self {
        Self::from_location(Location::caller(), function)
    }

    /// Builds a frame from a compiler-provided location.
    pub fn from_location(location: &Location<'_>, function: impl Into<String>) -> Self {
        Self {
            file: location.file().to_string(),
            line: location.line(),
            column: location.column(),
            function: function.into(),
        }
    }

    /// A frame standing in for a location that could not be resolved.
    pub fn unresolved() -> Self {
        Self {
            file: UNRESOLVED_FILE.to_string(),
            line: 0,
            column: 0,
            function: String::new(),
        }
    }
}

/// The fixed description of a registered step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDescription {
    text: String,
    name: String,
    depth: usize,
    origin_frames: Vec<SourceLocation>,
}

impl StepDescription {
    /// The full diagnostic line: padded location, indentation and name.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The operation name with its owner prefix stripped, plus the label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of enclosing steps that were executing at registration.
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// The registration site followed by the sites of the enclosing steps,
    /// innermost first.
    pub fn origin_frames(&self) -> &[SourceLocation] {
        &self.origin_frames
    }

    /// The registration site of this step.
    pub fn location(&self) -> &SourceLocation {
        // describe() never produces an empty frame list
        &self.origin_frames[0]
    }
}

impl std::fmt::Display for StepDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Turns origin frames into [`StepDescription`]s.
#[derive(Debug, Clone)]
pub struct StepDescriber {
    source_root: Option<PathBuf>,
    location_width: usize,
    owners: Vec<String>,
}

impl StepDescriber {
    /// Indentation per nesting level.
    pub const INDENT: usize = 3;

    /// Creates a describer stripping the given owner type names, e.g.
    /// `["Scheduler", "Scenario"]`, from operation names.
    pub fn new<I, S>(owners: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            source_root: None,
            location_width: 40,
            owners: owners.into_iter().map(Into::into).collect(),
        }
    }

    /// Shows absolute paths below `root` relative to it.
    #[must_use]
    pub fn with_source_root(mut self, root: Option<PathBuf>) -> Self {
        self.source_root = root;
        self
    }

    /// Pads the location column to `width` characters.
    #[must_use]
    pub const fn with_location_width(mut self, width: usize) -> Self {
        self.location_width = width;
        self
    }

    /// Describes a step from its origin frames (registration site first).
    ///
    /// An empty frame list degrades to an unresolved location; this never
    /// fails.
    pub fn describe(&self, mut frames: Vec<SourceLocation>, label: Option<&str>) -> StepDescription {
        if frames.is_empty() {
            frames.push(SourceLocation::unresolved());
        }
        let depth = frames.len() - 1;
        let user_frame = &frames[0];

        let function = self.strip_owner(&user_frame.function);
        let name = match label {
            Some(label) if function.is_empty() => label.to_string(),
            Some(label) => format!("{function}: {label}"),
            None => function.to_string(),
        };

        let location = format!(
            "{}:{}:{}",
            self.display_path(&user_frame.file),
            user_frame.line,
            user_frame.column
        );
        let text = format!(
            "{location:<width$} {indent}{name}",
            width = self.location_width,
            indent = " ".repeat(Self::INDENT * depth),
        );

        StepDescription {
            text,
            name,
            depth,
            origin_frames: frames,
        }
    }

    fn strip_owner<'a>(&self, function: &'a str) -> &'a str {
        match function.rsplit_once("::") {
            Some((owner_path, name)) => {
                let owner = owner_path.rsplit("::").next().unwrap_or(owner_path);
                if self.owners.iter().any(|known| known == owner) {
                    name
                } else {
                    function
                }
            }
            None => function,
        }
    }

    fn display_path(&self, file: &str) -> String {
        let path = Path::new(file);
        match &self.source_root {
            Some(root) if path.is_absolute() => path
                .strip_prefix(root)
                .map_or_else(|_| file.to_string(), |relative| relative.display().to_string()),
            _ => file.to_string(),
        }
    }
}

impl Default for StepDescriber {
    fn default() -> Self {
        Self::new(["Scheduler", "Scenario"])
    }
}
