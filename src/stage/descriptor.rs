//! Declarative stage definitions.
//!
//! A [`StageDescriptor`] captures everything needed to run one stage kind:
//! the image, a typed command template, the storage keys it reads and
//! writes, and its runtime requirements. Key templates carry `{placeholder}`
//! segments resolved against per-workflow [`Bindings`], so two concurrent
//! workflow runs with distinct folder ids never alias the same keys.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use thiserror::Error;

/// Error raised when a template references an unbound placeholder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unbound placeholder '{placeholder}' in template '{template}'")]
    UnboundPlaceholder {
        template: String,
        placeholder: String,
    },

    #[error("unterminated placeholder in template '{template}'")]
    Unterminated { template: String },
}

/// Values substituted into key and command templates for one workflow run.
#[derive(Debug, Clone, Default)]
pub struct Bindings(HashMap<String, String>);

impl Bindings {
    /// Creates an empty binding set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, builder-style.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds a binding.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Looks up a binding.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }
}

/// A storage key template with `{placeholder}` segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    template: String,
}

impl KeyTemplate {
    /// Creates a template. A template without placeholders is a literal key.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// The raw template string.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// The placeholder names referenced by the template, in order.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut rest = self.template.as_str();
        while let Some(start) = rest.find('{') {
            let Some(end) = rest[start..].find('}') else {
                break;
            };
            names.push(rest[start + 1..start + end].to_string());
            rest = &rest[start + end + 1..];
        }
        names
    }

    /// Resolves the template against bindings.
    pub fn resolve(&self, bindings: &Bindings) -> Result<String, TemplateError> {
        let mut resolved = String::with_capacity(self.template.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            resolved.push_str(&rest[..start]);
            let after = &rest[start..];
            let Some(end) = after.find('}') else {
                return Err(TemplateError::Unterminated {
                    template: self.template.clone(),
                });
            };

            let placeholder = &after[1..end];
            match bindings.get(placeholder) {
                Some(value) => resolved.push_str(value),
                None => {
                    return Err(TemplateError::UnboundPlaceholder {
                        template: self.template.clone(),
                        placeholder: placeholder.to_string(),
                    })
                }
            }
            rest = &after[end + 1..];
        }

        resolved.push_str(rest);
        Ok(resolved)
    }
}

impl From<&str> for KeyTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

/// One argument of a stage command.
#[derive(Debug, Clone)]
enum Arg {
    /// A fixed argument (script path, bucket name).
    Literal(String),
    /// An argument resolved against workflow bindings (object key, gender).
    Template(KeyTemplate),
}

/// Typed argument list for a stage container.
///
/// Arguments are built as discrete values rather than an interpolated
/// command string, so bindings can never smuggle extra arguments in.
#[derive(Debug, Clone, Default)]
pub struct StageCommand {
    args: Vec<Arg>,
}

impl StageCommand {
    /// Creates an empty command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fixed argument.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(Arg::Literal(value.into()));
        self
    }

    /// Appends a template argument resolved at run time.
    pub fn template(mut self, template: impl Into<KeyTemplate>) -> Self {
        self.args.push(Arg::Template(template.into()));
        self
    }

    /// Resolves the full argument list against bindings.
    pub fn resolve(&self, bindings: &Bindings) -> Result<Vec<String>, TemplateError> {
        self.args
            .iter()
            .map(|arg| match arg {
                Arg::Literal(value) => Ok(value.clone()),
                Arg::Template(template) => template.resolve(bindings),
            })
            .collect()
    }
}

impl From<&str> for StageCommand {
    /// Splits a fixed command line into literal arguments. Only for
    /// commands without templates.
    fn from(line: &str) -> Self {
        Self {
            args: line
                .split_whitespace()
                .map(|part| Arg::Literal(part.to_string()))
                .collect(),
        }
    }
}

/// A required input: a key template resolved within one bucket.
#[derive(Debug, Clone)]
pub struct StageInput {
    pub bucket: String,
    pub key: KeyTemplate,
}

/// A produced output: a key template resolved within one bucket.
#[derive(Debug, Clone)]
pub struct StageOutput {
    pub bucket: String,
    pub key: KeyTemplate,
}

/// Declarative definition of one pipeline stage. Immutable once built.
#[derive(Debug, Clone)]
pub struct StageDescriptor {
    /// Stage name used in logs and errors.
    pub name: String,
    /// Image the stage runs as.
    pub image: String,
    /// Typed command template.
    pub command: StageCommand,
    /// Keys that must exist before the stage starts.
    pub required_inputs: Vec<StageInput>,
    /// Keys the stage promises to write.
    pub produced_outputs: Vec<StageOutput>,
    /// Named network the container joins.
    pub network: String,
    /// Whether the stage needs GPU device access.
    pub gpu_required: bool,
    /// Extra environment, beyond the store credentials every stage gets.
    pub environment: BTreeMap<String, String>,
    /// Wall-clock budget for the container run.
    pub timeout: Duration,
}

impl StageDescriptor {
    /// Creates a descriptor with defaults: no keys, bridge-less network
    /// unset, no GPU, 30-minute timeout.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            command: StageCommand::new(),
            required_inputs: Vec::new(),
            produced_outputs: Vec::new(),
            network: String::new(),
            gpu_required: false,
            environment: BTreeMap::new(),
            timeout: Duration::from_secs(1800),
        }
    }

    /// Sets the command.
    pub fn with_command(mut self, command: StageCommand) -> Self {
        self.command = command;
        self
    }

    /// Declares a required input key.
    pub fn require(mut self, bucket: impl Into<String>, key: impl Into<KeyTemplate>) -> Self {
        self.required_inputs.push(StageInput {
            bucket: bucket.into(),
            key: key.into(),
        });
        self
    }

    /// Declares a produced output key.
    pub fn produce(mut self, bucket: impl Into<String>, key: impl Into<KeyTemplate>) -> Self {
        self.produced_outputs.push(StageOutput {
            bucket: bucket.into(),
            key: key.into(),
        });
        self
    }

    /// Sets the network the container joins.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = network.into();
        self
    }

    /// Requests GPU device access.
    pub fn with_gpu(mut self, gpu: bool) -> Self {
        self.gpu_required = gpu;
        self
    }

    /// Adds an environment variable.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(name.into(), value.into());
        self
    }

    /// Sets the per-stage timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
