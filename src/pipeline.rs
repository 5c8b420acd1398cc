//! Conversion pipeline and per-session state machine
//!
//! A [`Converter`] runs intake → decode → encode → package for one file.
//! A [`ConversionSession`] wraps a converter with the selected file and the
//! `Idle → Processing → Completed | Failed` state machine a UI drives.

use crate::codec::ConvertOptions;
use crate::error::{ConvertError, Result, ValidationError};
use crate::format::TabularFormat;
use crate::intake::{IntakePolicy, SourceFile};
use crate::package::{derive_file_name, ConversionResult};
use crate::types::TabularDocument;
use std::fmt;
use tracing::{debug, info, warn};

/// One conversion tool: which inputs it takes and what it produces
#[derive(Debug, Clone)]
pub struct Converter {
    target: TabularFormat,
    policy: IntakePolicy,
    options: ConvertOptions,
}

impl Converter {
    /// Converter into `target` accepting every other format
    pub fn new(target: TabularFormat) -> Self {
        let sources: Vec<TabularFormat> = TabularFormat::ALL
            .into_iter()
            .filter(|f| *f != target)
            .collect();
        Converter {
            target,
            policy: IntakePolicy::accepting(&sources),
            options: ConvertOptions::default(),
        }
    }

    pub fn with_policy(mut self, policy: IntakePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_options(mut self, options: ConvertOptions) -> Self {
        self.options = options;
        self
    }

    pub fn target(&self) -> TabularFormat {
        self.target
    }

    pub fn policy(&self) -> &IntakePolicy {
        &self.policy
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Validate `file` against the intake policy
    pub fn validate(&self, file: &SourceFile) -> std::result::Result<TabularFormat, ValidationError> {
        self.policy.validate(file)
    }

    /// Validate and decode without encoding
    pub fn inspect(&self, file: &SourceFile) -> Result<TabularDocument> {
        let format = self.validate(file)?;
        Ok(self.options.decoder(format).decode(&file.bytes)?)
    }

    /// Validate, decode, encode and package `file`
    pub fn convert(&self, file: &SourceFile) -> Result<ConversionResult> {
        let format = self.validate(file)?;
        self.run(file, format)
    }

    /// Decode and encode a file whose format is already known
    fn run(&self, file: &SourceFile, source_format: TabularFormat) -> Result<ConversionResult> {
        debug!(file = %file.name, from = %source_format, to = %self.target, "decoding");
        let doc = self.options.decoder(source_format).decode(&file.bytes)?;

        debug!(
            rows = doc.row_count(),
            columns = doc.column_count(),
            "encoding"
        );
        let bytes = self.options.encoder(self.target).encode(&doc)?;

        let result = ConversionResult::new(
            bytes,
            derive_file_name(&file.name, source_format, self.target),
            self.target,
            doc.row_count(),
            doc.column_count(),
        );
        info!(
            file = %result.file_name(),
            rows = result.rows(),
            columns = result.columns(),
            bytes = result.byte_size(),
            "conversion completed"
        );
        Ok(result)
    }
}

/// State of a session
#[derive(Debug)]
pub enum ConversionState {
    Idle,
    Processing,
    Completed(ConversionResult),
    Failed(ConvertError),
}

impl ConversionState {
    pub fn kind(&self) -> StateKind {
        match self {
            ConversionState::Idle => StateKind::Idle,
            ConversionState::Processing => StateKind::Processing,
            ConversionState::Completed(_) => StateKind::Completed,
            ConversionState::Failed(_) => StateKind::Failed,
        }
    }
}

/// Payload-free view of [`ConversionState`], handed to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Idle,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StateKind::Idle => "idle",
            StateKind::Processing => "processing",
            StateKind::Completed => "completed",
            StateKind::Failed => "failed",
        };
        f.write_str(s)
    }
}

type Observer = Box<dyn FnMut(StateKind)>;

/// Selected file plus conversion state for one user
pub struct ConversionSession {
    converter: Converter,
    selected: Option<(SourceFile, TabularFormat)>,
    state: ConversionState,
    observer: Option<Observer>,
}

impl ConversionSession {
    pub fn new(converter: Converter) -> Self {
        ConversionSession {
            converter,
            selected: None,
            state: ConversionState::Idle,
            observer: None,
        }
    }

    /// Call `observer` with each state as it is entered
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: FnMut(StateKind) + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn state(&self) -> &ConversionState {
        &self.state
    }

    pub fn selected_file(&self) -> Option<&SourceFile> {
        self.selected.as_ref().map(|(file, _)| file)
    }

    /// Result of the last conversion, if it succeeded
    pub fn result(&self) -> Option<&ConversionResult> {
        match &self.state {
            ConversionState::Completed(result) => Some(result),
            _ => None,
        }
    }

    /// Error of the last conversion, if it failed
    pub fn error(&self) -> Option<&ConvertError> {
        match &self.state {
            ConversionState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the convert action is available
    pub fn can_convert(&self) -> bool {
        self.selected.is_some() && self.state.kind() != StateKind::Processing
    }

    /// Replace the selected file. Any previous result or error is dropped
    /// first; a file that fails validation is not kept.
    pub fn select_file(&mut self, file: SourceFile) -> std::result::Result<TabularFormat, ValidationError> {
        self.selected = None;
        self.transition(ConversionState::Idle);

        match self.converter.validate(&file) {
            Ok(format) => {
                debug!(file = %file.name, format = %format, "file selected");
                self.selected = Some((file, format));
                Ok(format)
            }
            Err(err) => {
                warn!(file = %file.name, error = %err, "file rejected");
                Err(err)
            }
        }
    }

    /// Run the conversion for the selected file.
    ///
    /// Returns the state that was entered; the result or error is then
    /// available through [`result`](Self::result) / [`error`](Self::error).
    pub fn convert(&mut self) -> Result<StateKind> {
        if self.selected.is_none() {
            return Err(ConvertError::NoFileSelected);
        }

        self.transition(ConversionState::Processing);
        let next = match &self.selected {
            Some((file, format)) => match self.converter.run(file, *format) {
                Ok(result) => ConversionState::Completed(result),
                Err(err) => {
                    warn!(file = %file.name, error = %err, "conversion failed");
                    ConversionState::Failed(err)
                }
            },
            None => ConversionState::Failed(ConvertError::NoFileSelected),
        };
        self.transition(next);
        Ok(self.state.kind())
    }

    /// Take the result out, leaving the session idle
    pub fn take_result(&mut self) -> Option<ConversionResult> {
        match std::mem::replace(&mut self.state, ConversionState::Idle) {
            ConversionState::Completed(result) => {
                self.notify();
                Some(result)
            }
            other => {
                self.state = other;
                None
            }
        }
    }

    fn transition(&mut self, next: ConversionState) {
        self.state = next;
        self.notify();
    }

    fn notify(&mut self) {
        let kind = self.state.kind();
        if let Some(observer) = self.observer.as_mut() {
            observer(kind);
        }
    }
}

impl fmt::Debug for ConversionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionSession")
            .field("converter", &self.converter)
            .field("selected", &self.selected_file().map(|file| &file.name))
            .field("state", &self.state.kind())
            .finish()
    }
}
