//! Function configuration: the raw `config.json` document, environment
//! overrides, and the one-time validation pass that produces the immutable
//! [`SignatureConfig`] shared by every request handler.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Which wire-invocation convention the deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureType {
    Http,
    CloudEvent,
    OpenFunction,
}

impl SignatureType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "http" => Some(Self::Http),
            "cloudevent" => Some(Self::CloudEvent),
            "openfunction" => Some(Self::OpenFunction),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::CloudEvent => "cloudevent",
            Self::OpenFunction => "openfunction",
        }
    }
}

/// Sub-variant of the openfunction signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FunctionMode {
    Subscribe,
    BindingReceive,
}

impl FunctionMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "subscribe" => Some(Self::Subscribe),
            "binding-receive" => Some(Self::BindingReceive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::BindingReceive => "binding-receive",
        }
    }
}

/// Kind of Dapr component behind an input or output. Deserializing into an
/// enum makes "exactly one of" hold by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Pubsub,
    Bindings,
    Invoke,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ComponentParams {
    #[serde(rename = "type")]
    pub component_type: ComponentType,
    #[serde(default)]
    pub operation: Option<String>,
}

/// Where inbound events come from in subscribe/binding-receive mode.
#[derive(Debug, Clone, Deserialize)]
pub struct InputTopology {
    pub name: String,
    #[serde(default)]
    pub uri: String,
    pub params: ComponentParams,
}

/// One downstream sink a function result is forwarded to.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputTopology {
    pub name: String,
    #[serde(default)]
    pub uri: String,
    pub params: ComponentParams,
}

/// The configuration document as it sits on disk. Every field is optional;
/// env vars override the file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub pubsub_name: Option<String>,
    #[serde(default)]
    pub pubsub_topic: Option<String>,
    #[serde(default)]
    pub binding_name: Option<String>,
    #[serde(default)]
    pub input: Option<InputTopology>,
    #[serde(default)]
    pub outputs: Vec<OutputTopology>,
}

impl RawConfig {
    /// Read the document from `path`. A missing file is an empty document:
    /// the http and cloudevent signatures need no topology at all.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        serde_json::from_str(&contents).map_err(|err| {
            tracing::warn!("failed to parse {}: {}", path.display(), err);
            ConfigError::Parse {
                path: path.display().to_string(),
                message: err.to_string(),
            }
        })
    }

    /// Apply environment overrides. Env names match the original scalar
    /// fields; an empty env value is treated as unset.
    pub fn apply_env(&mut self) {
        for (var, slot) in [
            ("STATE_NAME", &mut self.state_name),
            ("PUBSUB_NAME", &mut self.pubsub_name),
            ("PUBSUB_TOPIC", &mut self.pubsub_topic),
            ("BINDING_NAME", &mut self.binding_name),
        ] {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    *slot = Some(value);
                }
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },
    #[error("mode '{mode}' is only valid with the openfunction source")]
    ModeWithoutOpenFunction { mode: &'static str },
    #[error("subscribe mode requires a pubsub name and topic in the input topology")]
    SubscribeInputMissing,
    #[error("subscribe mode requires a pubsub-typed input, got {got}")]
    SubscribeInputNotPubsub { got: &'static str },
    #[error("binding-receive mode requires a binding name in the input topology")]
    BindingInputMissing,
    #[error("binding-receive mode requires a bindings-typed input, got {got}")]
    BindingInputNotBindings { got: &'static str },
    #[error("output at index {index} has an empty name")]
    OutputNameEmpty { index: usize },
    #[error("duplicate output name '{name}'")]
    OutputNameDuplicate { name: String },
    #[error("pubsub output '{name}' has an empty topic uri")]
    PubsubOutputMissingTopic { name: String },
    #[error("bindings output '{name}' requires an operation")]
    BindingOutputMissingOperation { name: String },
    #[error("invoke outputs are not deliverable sinks ('{name}')")]
    InvokeOutputUnsupported { name: String },
}

fn component_type_name(component_type: ComponentType) -> &'static str {
    match component_type {
        ComponentType::Pubsub => "pubsub",
        ComponentType::Bindings => "bindings",
        ComponentType::Invoke => "invoke",
    }
}

/// The validated, immutable routing configuration. Constructed exactly once
/// at startup and shared read-only by every request.
#[derive(Debug, Clone)]
pub struct SignatureConfig {
    pub source: SignatureType,
    pub mode: Option<FunctionMode>,
    pub state_name: String,
    pub input: Option<InputTopology>,
    pub outputs: Vec<OutputTopology>,
}

impl SignatureConfig {
    /// Single validation pass. Collects every error instead of stopping at
    /// the first one so operators see the whole picture before the process
    /// refuses to start.
    pub fn validate(
        raw: RawConfig,
        source: SignatureType,
        mode: Option<FunctionMode>,
    ) -> Result<Self, Vec<ConfigError>> {
        let mut errors = Vec::new();

        if let Some(mode) = mode {
            if source != SignatureType::OpenFunction {
                errors.push(ConfigError::ModeWithoutOpenFunction {
                    mode: mode.as_str(),
                });
            }
        }

        let input = resolve_input(&raw, mode, &mut errors);

        let mut seen = HashSet::new();
        for (index, output) in raw.outputs.iter().enumerate() {
            if output.name.is_empty() {
                errors.push(ConfigError::OutputNameEmpty { index });
                continue;
            }
            if !seen.insert(output.name.clone()) {
                errors.push(ConfigError::OutputNameDuplicate {
                    name: output.name.clone(),
                });
            }
            match output.params.component_type {
                ComponentType::Pubsub => {
                    if output.uri.is_empty() {
                        errors.push(ConfigError::PubsubOutputMissingTopic {
                            name: output.name.clone(),
                        });
                    }
                }
                ComponentType::Bindings => {
                    if output
                        .params
                        .operation
                        .as_deref()
                        .unwrap_or("")
                        .is_empty()
                    {
                        errors.push(ConfigError::BindingOutputMissingOperation {
                            name: output.name.clone(),
                        });
                    }
                }
                ComponentType::Invoke => {
                    errors.push(ConfigError::InvokeOutputUnsupported {
                        name: output.name.clone(),
                    });
                }
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(Self {
            source,
            mode,
            state_name: raw.state_name.unwrap_or_default(),
            input,
            outputs: raw.outputs,
        })
    }

    /// Pubsub component name visible to the invocation context, if any.
    pub fn pubsub_name(&self) -> &str {
        match &self.input {
            Some(input) if input.params.component_type == ComponentType::Pubsub => &input.name,
            _ => "",
        }
    }

    /// Binding component name visible to the invocation context, if any.
    pub fn binding_name(&self) -> &str {
        match &self.input {
            Some(input) if input.params.component_type == ComponentType::Bindings => &input.name,
            _ => "",
        }
    }
}

/// Resolve the input topology for the configured mode, deriving it from the
/// back-compat scalar fields when the structured form is absent.
fn resolve_input(
    raw: &RawConfig,
    mode: Option<FunctionMode>,
    errors: &mut Vec<ConfigError>,
) -> Option<InputTopology> {
    match mode {
        Some(FunctionMode::Subscribe) => {
            let input = raw.input.clone().or_else(|| {
                match (raw.pubsub_name.as_deref(), raw.pubsub_topic.as_deref()) {
                    (Some(name), Some(topic)) if !name.is_empty() && !topic.is_empty() => {
                        Some(InputTopology {
                            name: name.to_string(),
                            uri: topic.to_string(),
                            params: ComponentParams {
                                component_type: ComponentType::Pubsub,
                                operation: None,
                            },
                        })
                    }
                    _ => None,
                }
            });
            match input {
                Some(input) => {
                    if input.params.component_type != ComponentType::Pubsub {
                        errors.push(ConfigError::SubscribeInputNotPubsub {
                            got: component_type_name(input.params.component_type),
                        });
                        None
                    } else if input.name.is_empty() || input.uri.is_empty() {
                        errors.push(ConfigError::SubscribeInputMissing);
                        None
                    } else {
                        Some(input)
                    }
                }
                None => {
                    errors.push(ConfigError::SubscribeInputMissing);
                    None
                }
            }
        }
        Some(FunctionMode::BindingReceive) => {
            let input = raw.input.clone().or_else(|| {
                raw.binding_name.as_deref().and_then(|name| {
                    if name.is_empty() {
                        None
                    } else {
                        Some(InputTopology {
                            name: name.to_string(),
                            uri: String::new(),
                            params: ComponentParams {
                                component_type: ComponentType::Bindings,
                                operation: None,
                            },
                        })
                    }
                })
            });
            match input {
                Some(input) => {
                    if input.params.component_type != ComponentType::Bindings {
                        errors.push(ConfigError::BindingInputNotBindings {
                            got: component_type_name(input.params.component_type),
                        });
                        None
                    } else if input.name.is_empty() {
                        errors.push(ConfigError::BindingInputMissing);
                        None
                    } else {
                        Some(input)
                    }
                }
                None => {
                    errors.push(ConfigError::BindingInputMissing);
                    None
                }
            }
        }
        None => raw.input.clone(),
    }
}
