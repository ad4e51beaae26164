//! Static model capability catalog
//!
//! Capability ratings for models commonly served by Ollama endpoints.
//! Live discovery attaches these profiles to installed models; models
//! without a profile are skipped by the router.

use serde::{Deserialize, Serialize};

/// How well a model handles native tool calling
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallingQuality {
    #[default]
    None,
    Basic,
    Good,
    Excellent,
}

impl ToolCallingQuality {
    /// Score used when ranking models for selection
    pub fn selection_score(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Basic => 5.0,
            Self::Good => 15.0,
            Self::Excellent => 25.0,
        }
    }

    /// Additive bonus used by the router's final scoring
    pub fn routing_bonus(&self) -> f64 {
        match self {
            Self::None => 0.0,
            Self::Basic => 5.0,
            Self::Good => 10.0,
            Self::Excellent => 15.0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Basic => "basic",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

impl std::fmt::Display for ToolCallingQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static capability record for a known model
#[derive(Debug, Clone, Serialize)]
pub struct ModelProfile {
    pub name: &'static str,
    pub context_window: u32,
    /// 1-10, higher is better output quality
    pub quality_rating: u8,
    /// 1-10, higher is faster
    pub speed_rating: u8,
    pub task_tags: &'static [&'static str],
    pub tool_calling: ToolCallingQuality,
}

impl ModelProfile {
    /// Check if the model supports any form of tool calling
    pub fn supports_tool_calling(&self) -> bool {
        self.tool_calling != ToolCallingQuality::None
    }
}

/// Model families known to handle Ollama's native tool calling even
/// without a catalog entry
pub const TOOL_CAPABLE_FAMILIES: &[&str] = &[
    "qwen2.5",
    "qwen2:",
    "devstral",
    "mistral-nemo",
    "llama3.1",
    "llama3.2",
    "llama3.3",
    "command-r",
    "firefunction",
    "hermes",
];

const CATALOG: &[(&str, ModelProfile)] = &[
    (
        "qwen2.5:7b",
        ModelProfile {
            name: "qwen2.5",
            context_window: 32768,
            quality_rating: 7,
            speed_rating: 8,
            task_tags: &["code_review", "debugging", "refactoring", "testing", "documentation", "architecture"],
            tool_calling: ToolCallingQuality::Good,
        },
    ),
    (
        "qwen2.5:14b",
        ModelProfile {
            name: "qwen2.5",
            context_window: 32768,
            quality_rating: 9,
            speed_rating: 6,
            task_tags: &[
                "code_review",
                "debugging",
                "refactoring",
                "testing",
                "security_audit",
                "documentation",
                "architecture",
            ],
            tool_calling: ToolCallingQuality::Excellent,
        },
    ),
    (
        "devstral:24b",
        ModelProfile {
            name: "devstral",
            context_window: 32768,
            quality_rating: 9,
            speed_rating: 4,
            task_tags: &[
                "code_review",
                "debugging",
                "refactoring",
                "testing",
                "security_audit",
                "documentation",
                "architecture",
            ],
            tool_calling: ToolCallingQuality::Excellent,
        },
    ),
    (
        "llama3.1:8b",
        ModelProfile {
            name: "llama3.1",
            context_window: 131072,
            quality_rating: 7,
            speed_rating: 8,
            task_tags: &["documentation", "code_review", "debugging", "general"],
            tool_calling: ToolCallingQuality::Good,
        },
    ),
    (
        "mistral-nemo:12b",
        ModelProfile {
            name: "mistral-nemo",
            context_window: 128000,
            quality_rating: 8,
            speed_rating: 7,
            task_tags: &["code_review", "debugging", "documentation", "architecture"],
            tool_calling: ToolCallingQuality::Excellent,
        },
    ),
    (
        "deepseek-coder-1.3b",
        ModelProfile {
            name: "deepseek-coder",
            context_window: 16384,
            quality_rating: 6,
            speed_rating: 10,
            task_tags: &["code_completion", "syntax_fix", "simple_generation"],
            tool_calling: ToolCallingQuality::None,
        },
    ),
    (
        "deepseek-coder-6.7b",
        ModelProfile {
            name: "deepseek-coder",
            context_window: 16384,
            quality_rating: 7,
            speed_rating: 8,
            task_tags: &["code_generation", "code_review", "debugging", "refactoring"],
            tool_calling: ToolCallingQuality::None,
        },
    ),
    (
        "codellama-13b",
        ModelProfile {
            name: "codellama",
            context_window: 16384,
            quality_rating: 7,
            speed_rating: 6,
            task_tags: &["code_generation", "debugging", "documentation"],
            tool_calling: ToolCallingQuality::None,
        },
    ),
    (
        "mistral-7b",
        ModelProfile {
            name: "mistral",
            context_window: 8192,
            quality_rating: 6,
            speed_rating: 9,
            task_tags: &["general", "documentation"],
            tool_calling: ToolCallingQuality::Basic,
        },
    ),
    (
        "mixtral-8x7b",
        ModelProfile {
            name: "mixtral",
            context_window: 32768,
            quality_rating: 8,
            speed_rating: 5,
            task_tags: &["code_generation", "code_review", "architecture", "general"],
            tool_calling: ToolCallingQuality::Basic,
        },
    ),
    (
        "llama3-8b",
        ModelProfile {
            name: "llama3",
            context_window: 8192,
            quality_rating: 7,
            speed_rating: 8,
            task_tags: &["general", "documentation", "code_generation"],
            tool_calling: ToolCallingQuality::None,
        },
    ),
    (
        "sqlcoder-7b",
        ModelProfile {
            name: "sqlcoder",
            context_window: 8192,
            quality_rating: 7,
            speed_rating: 8,
            task_tags: &["sql", "code_generation"],
            tool_calling: ToolCallingQuality::None,
        },
    ),
    (
        "starcoder2-15b",
        ModelProfile {
            name: "starcoder2",
            context_window: 16384,
            quality_rating: 8,
            speed_rating: 6,
            task_tags: &["code_generation", "code_completion", "refactoring"],
            tool_calling: ToolCallingQuality::None,
        },
    ),
];

/// Look up the profile for a model name
///
/// Tries an exact match, then the colon-stripped base name, then a
/// substring match over catalog keys.
pub fn profile_for(model_name: &str) -> Option<&'static ModelProfile> {
    let base_name = model_name.split(':').next().unwrap_or(model_name);

    if let Some((_, profile)) = CATALOG.iter().find(|(key, _)| *key == model_name) {
        return Some(profile);
    }
    if let Some((_, profile)) = CATALOG.iter().find(|(key, _)| *key == base_name) {
        return Some(profile);
    }
    CATALOG
        .iter()
        .find(|(key, _)| key.contains(base_name))
        .map(|(_, profile)| profile)
}

/// All profiles in the static catalog
pub fn catalog_size() -> usize {
    CATALOG.len()
}
