use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Result, bail, eyre};
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

const CARING_MOTHER: &str = "你現在扮演一位住在台灣、心地善良且關心子女的台灣媽媽，在跟你的小孩講話。
你的語氣溫暖、親切，有時會有點嘮叨，但都是出於關心。
你會自然地使用一些台語詞彙或帶有台灣口音的國語（例如：『嘿呀』、『安捏』、『母湯』、『金價』）。
你不會用 emoji，也不過度扮演角色。你只會回覆使用者目前與你的對話，不會扯太遠。
當用戶遇到困難時，你會給予鼓勵和實際的建議；當用戶分享開心的事情時，你會替他們感到高興。
你會適度關心對方，像是問吃飯、提醒早睡等，但不會碎唸。
避免使用過於正式的詞彙，多使用生活化、口語化的表達，且保持正常訊息該有的長度。

以下是用戶的訊息：";

/// The instruction text that shapes the assistant's tone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Persona {
    instruction: String,
}

impl Persona {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }

    pub fn caring_mother() -> Self {
        Self::new(CARING_MOTHER)
    }

    /// Read a persona from a text file. Surrounding whitespace is dropped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| eyre!("Failed to read persona file {}: {}", path.display(), e))?;
        let text = text.trim();
        if text.is_empty() {
            bail!("Persona file {} is empty", path.display());
        }
        Ok(Self::new(text))
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }
}

impl Default for Persona {
    fn default() -> Self {
        Self::caring_mother()
    }
}

/// Values given on the command line. They win over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub persona_file: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

#[derive(Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
    pub persona: Persona,
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("persona", &self.persona)
            .finish()
    }
}

impl ChatConfig {
    /// Load from the process environment, then apply `overrides`.
    pub fn load(overrides: ConfigOverrides) -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok(), overrides, default_persona_path())
    }

    /// `default_persona` is only used when neither the flag nor
    /// `MOM_CHAT_PERSONA_FILE` names a file, and only if it exists.
    pub fn from_lookup<F>(
        lookup: F,
        overrides: ConfigOverrides,
        default_persona: Option<PathBuf>,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = lookup("GEMINI_API_KEY")
            .ok_or_else(|| eyre!("GEMINI_API_KEY environment variable not set"))?;

        let api_base = lookup("GEMINI_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        let model = overrides
            .model
            .or_else(|| lookup("MOM_CHAT_MODEL"))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let timeout_secs = match overrides.timeout_secs {
            Some(secs) => secs,
            None => match lookup("MOM_CHAT_TIMEOUT_SECS") {
                Some(raw) => raw
                    .trim()
                    .parse()
                    .map_err(|_| eyre!("MOM_CHAT_TIMEOUT_SECS is not a number: {}", raw))?,
                None => DEFAULT_TIMEOUT_SECS,
            },
        };
        if timeout_secs == 0 {
            bail!("Timeout must be at least one second");
        }

        let persona_path = overrides
            .persona_file
            .or_else(|| lookup("MOM_CHAT_PERSONA_FILE").map(|p| expand_home(&p)));
        let persona = match persona_path {
            Some(path) => Persona::from_file(&path)?,
            None => match default_persona.filter(|p| p.is_file()) {
                Some(path) => {
                    debug!("Using persona from {}", path.display());
                    Persona::from_file(&path)?
                }
                None => Persona::caring_mother(),
            },
        };

        Ok(Self {
            api_key,
            api_base,
            model,
            timeout: Duration::from_secs(timeout_secs),
            persona,
        })
    }
}

fn default_persona_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mom-chat").join("persona.txt"))
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    let path = path.trim();

    if let Some(home) = dirs::home_dir() {
        if path == "~" {
            return home;
        } else if let Some(rest) = path.strip_prefix("~/") {
            return home.join(rest);
        }
    }

    PathBuf::from(path)
}
