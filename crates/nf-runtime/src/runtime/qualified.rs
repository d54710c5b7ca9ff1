use nf_core::{HostValue, NfError, NfResult, NfValue, SourceSpan};
use tracing::debug;

use super::arguments::CallArgument;
use super::Runtime;
use crate::bridge::is_qualified_name;
use crate::context::ContextId;
use crate::options::{DiagnosticSymbols, TOKEN_OPTIONAL, TOKEN_SEPARATOR};

/// Suffix marking a path segment as optional.
pub const OPTIONAL_MARKER: &str = "؟";
const SEPARATOR: &str = ":";

/// Colon-separated access path with per-segment optional markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedPath {
    segments: Vec<String>,
    marked: Vec<bool>,
}

impl QualifiedPath {
    pub fn parse(path: &str) -> NfResult<Self> {
        let invalid = || {
            NfError::new(
                "RUNTIME_INVALID_QUALIFIED_NAME",
                format!("\"{}\" is not a valid qualified name.", path),
            )
        };
        if !is_qualified_name(path) {
            return Err(invalid());
        }
        let mut segments = Vec::new();
        let mut marked = Vec::new();
        for raw in path.split(SEPARATOR) {
            let (name, optional) = match raw.strip_suffix(OPTIONAL_MARKER) {
                Some(name) => (name, true),
                None => (raw, false),
            };
            if name.is_empty() || name.contains(OPTIONAL_MARKER) {
                return Err(invalid());
            }
            segments.push(name.to_string());
            marked.push(optional);
        }
        Ok(Self { segments, marked })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Markers that matter for traversal; the last segment is the target
    /// itself and never short-circuits on its own.
    pub fn optional(&self) -> &[bool] {
        &self.marked[..self.marked.len().saturating_sub(1)]
    }

    /// Whether a child missing at `index` short-circuits to `None`: every
    /// marker up to and including that segment must be set.
    pub fn is_safe_through(&self, index: usize) -> bool {
        let optional = self.optional();
        !optional.is_empty() && optional[..(index + 1).min(optional.len())].iter().all(|m| *m)
    }

    /// The path up to `index`, each segment with its own marker.
    pub fn render_until(&self, index: usize, symbols: &DiagnosticSymbols) -> String {
        let separator = symbols.display_or(TOKEN_SEPARATOR, SEPARATOR);
        let marker = symbols.display_or(TOKEN_OPTIONAL, OPTIONAL_MARKER);
        self.segments
            .iter()
            .zip(&self.marked)
            .take(index + 1)
            .map(|(segment, optional)| {
                if *optional {
                    format!("{}{}", segment, marker)
                } else {
                    segment.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(&separator)
    }
}

impl Runtime {
    /// Reads `a:b:c`. A missing intermediate step yields `None` when the
    /// chain up to it is fully optional and fails with the partial path
    /// otherwise. A missing final segment always fails.
    pub fn read_qualified(&self, context: ContextId, path: &str) -> NfResult<NfValue> {
        let path = QualifiedPath::parse(path)?;
        let Some(root) = self.find_variable(context, &path.segments[0], false)? else {
            if path.len() > 1 && path.optional().iter().all(|m| *m) {
                return Ok(NfValue::None);
            }
            return Err(self.path_not_found(&path, 0));
        };

        let last = path.len() - 1;
        let mut current = root.value().clone();
        for (index, segment) in path.segments.iter().enumerate().skip(1) {
            match self.child_value(&current, segment)? {
                Some(value) => current = value,
                None if index < last && path.is_safe_through(index) => return Ok(NfValue::None),
                None => return Err(self.path_not_found(&path, index)),
            }
        }
        Ok(current)
    }

    /// Writes `a:b:c`. The root binding must exist; an optional missing
    /// intermediate turns the write into a no-op.
    pub fn write_qualified(&self, context: ContextId, path: &str, value: NfValue) -> NfResult<()> {
        let path = QualifiedPath::parse(path)?;
        if path.len() == 1 {
            return self.assign_variable(context, &path.segments[0], value);
        }
        let root = self
            .find_variable(context, &path.segments[0], false)?
            .ok_or_else(|| self.path_not_found(&path, 0))?;

        let last = path.len() - 1;
        let mut current = root.value().clone();
        for (index, segment) in path.segments.iter().enumerate().take(last).skip(1) {
            match self.child_value(&current, segment)? {
                Some(child) => current = child,
                None if path.is_safe_through(index) => return Ok(()),
                None => return Err(self.path_not_found(&path, index)),
            }
        }

        let field = &path.segments[last];
        match current {
            NfValue::Object(object) => {
                if object.assign(field, value)? {
                    Ok(())
                } else {
                    Err(self.path_not_found(&path, last))
                }
            }
            NfValue::Host(host) => self.write_host_field(&host, field, value),
            NfValue::None if path.optional()[last - 1] => Ok(()),
            _ => Err(self.path_not_found(&path, last)),
        }
    }

    /// One traversal step. Anything that is not an object counts as missing.
    fn child_value(&self, value: &NfValue, name: &str) -> NfResult<Option<NfValue>> {
        match value {
            NfValue::Object(object) => Ok(object.get(name)),
            NfValue::Host(host) => self.read_host_field(host, name),
            _ => Ok(None),
        }
    }

    /// Reads through a registered accessor (`Owner::get_field`, then
    /// `Owner::field`) before falling back to the object itself.
    pub fn read_host_field(&self, host: &HostValue, field: &str) -> NfResult<Option<NfValue>> {
        let policy = self.field_access();
        let owner = host.type_name();
        for getter in [format!("{}::get_{}", owner, field), format!("{}::{}", owner, field)] {
            let Some(callable) = self.find_native(&getter) else {
                continue;
            };
            let receiver = CallArgument::positional(NfValue::Host(host.clone()));
            match self.invoke(
                ContextId::ROOT,
                &getter,
                &callable,
                vec![receiver],
                None,
                &SourceSpan::synthetic(),
            ) {
                Ok(value) => return Ok(Some(value)),
                Err(_) if policy.fail_fast && policy.safe => return Ok(None),
                Err(error) if policy.fail_fast => return Err(error),
                Err(error) => {
                    debug!(getter = %getter, error = %error, "accessor failed, reading field directly");
                }
            }
        }
        Ok(host.get_field(field))
    }

    /// Writes through `Owner::set_field` or directly, then reads the field
    /// back; a value that did not stick is an illegal write.
    pub fn write_host_field(&self, host: &HostValue, field: &str, value: NfValue) -> NfResult<()> {
        let policy = self.field_access();
        let setter = format!("{}::set_{}", host.type_name(), field);
        let written = match self.find_native(&setter) {
            Some(callable) => self
                .invoke(
                    ContextId::ROOT,
                    &setter,
                    &callable,
                    vec![
                        CallArgument::positional(NfValue::Host(host.clone())),
                        CallArgument::positional(value.clone()),
                    ],
                    None,
                    &SourceSpan::synthetic(),
                )
                .map(|_| ())
                .map_err(|error| error.message),
            None => host.set_field(field, value.clone()),
        };
        if let Err(reason) = written {
            if !policy.safe {
                return Err(illegal_write(host, field, &reason));
            }
            debug!(field, reason = %reason, "host write failed");
        }

        match self.read_host_field(host, field)? {
            Some(current) if current == value => Ok(()),
            _ => Err(illegal_write(host, field, "the value did not take effect")),
        }
    }

    fn path_not_found(&self, path: &QualifiedPath, index: usize) -> NfError {
        NfError::new(
            "RUNTIME_VARIABLE_NOT_FOUND",
            format!(
                "Variable \"{}\" was not found.",
                path.render_until(index, self.symbols())
            ),
        )
    }
}

fn illegal_write(host: &HostValue, field: &str, reason: &str) -> NfError {
    NfError::new(
        "RUNTIME_ILLEGAL_FIELD_WRITE",
        format!(
            "Field \"{}\" of {} cannot be written: {}.",
            field,
            host.type_name(),
            reason
        ),
    )
}
