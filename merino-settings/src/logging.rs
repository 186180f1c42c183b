use anyhow::{bail, Context};
use serde::{de, ser::SerializeSeq, Deserialize, Serialize};
use std::{ops::AddAssign, str::FromStr};
use tracing_subscriber::{filter::Directive, EnvFilter};

/// How the weather tools report what they are doing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter directives selecting which events are emitted.
    ///
    /// A bare level (`ERROR` through `TRACE`) sets the default. A
    /// `target=LEVEL` entry overrides it for one crate or module, for example
    /// `merino_cache::redis=TRACE` to follow every cache round trip while the
    /// rest of the workspace stays at `INFO`.
    ///
    /// Directives in `RUST_LOG` are appended after the configured ones, so a
    /// one-off run can turn up the pathfinder without editing `config/`:
    ///
    /// ```shell
    /// RUST_LOG=merino_weather::pathfinder=DEBUG merino weather --country IT --city Matera
    /// ```
    ///
    /// In YAML the directives are usually listed one per line:
    ///
    /// ```yaml
    /// logging:
    ///   levels:
    ///     - WARN
    ///     - merino_weather=INFO
    ///     - merino_circuit_breaker=DEBUG
    /// ```
    pub levels: DirectiveWrapper,

    /// How each event is rendered on stderr.
    pub format: LogFormat,
}

/// Renderings of log events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line output with span context, for reading in a terminal.
    Pretty,

    /// One JSON object per line. The integration tests parse this form, so
    /// event fields such as `type` stay machine readable.
    Json,

    /// A single line of text per event.
    Compact,
}

/// Validated filter directives, kept as strings.
///
/// [`Directive`] itself cannot be cloned or written back out, so the text
/// form is stored and only turned into an [`EnvFilter`] when logging starts.
/// Settings files give a list, environment variables give a comma separated
/// string, and both are accepted. Entries in a list may themselves contain
/// commas.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectiveWrapper(Vec<String>);

impl DirectiveWrapper {
    /// The directives, in the order they are applied.
    pub fn directives(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl Serialize for DirectiveWrapper {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for directive in self.directives() {
            seq.serialize_element(directive)?;
        }
        seq.end()
    }
}

/// Turn a parse failure into a serde error pointing at the offending text.
fn invalid<E: de::Error>(text: &str, error: &anyhow::Error) -> E {
    E::invalid_value(de::Unexpected::Str(text), &format!("{:#}", error).as_str())
}

impl<'de> Deserialize<'de> for DirectiveWrapper {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct DirectivesVisitor;

        impl<'de> de::Visitor<'de> for DirectivesVisitor {
            type Value = DirectiveWrapper;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a log filter directive, or a list of them")
            }

            fn visit_str<E: de::Error>(self, text: &str) -> Result<Self::Value, E> {
                text.parse::<DirectiveWrapper>()
                    .map_err(|error| invalid(text, &error))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut directives = DirectiveWrapper(Vec::new());
                while let Some(entry) = seq.next_element::<String>()? {
                    directives += entry
                        .parse::<DirectiveWrapper>()
                        .map_err(|error| invalid(&entry, &error))?;
                }
                Ok(directives)
            }
        }

        let mut directives = deserializer.deserialize_any(DirectivesVisitor)?;
        if let Ok(rust_log) = std::env::var("RUST_LOG") {
            directives += rust_log
                .parse::<DirectiveWrapper>()
                .map_err(|error| invalid::<D::Error>(&rust_log, &error))?;
        }
        Ok(directives)
    }
}

impl FromStr for DirectiveWrapper {
    type Err = anyhow::Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut directives = Vec::new();
        for entry in text.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            entry
                .parse::<Directive>()
                .with_context(|| format!("`{}` is not a log filter directive", entry))?;
            // Crate names are spelled with underscores in targets.
            if entry.contains('-') {
                bail!("log target `{}` contains a hyphen", entry);
            }
            directives.push(entry.to_string());
        }
        Ok(Self(directives))
    }
}

impl AddAssign for DirectiveWrapper {
    fn add_assign(&mut self, rhs: Self) {
        self.0.extend(rhs.0)
    }
}

impl From<&DirectiveWrapper> for EnvFilter {
    fn from(wrapper: &DirectiveWrapper) -> Self {
        wrapper
            .directives()
            .filter_map(|directive| directive.parse::<Directive>().ok())
            .fold(EnvFilter::default(), EnvFilter::add_directive)
    }
}
