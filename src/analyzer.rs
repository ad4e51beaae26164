//! Task analyzer - classifies prompts into type, complexity, and tags
//!
//! Pure keyword and regex heuristics; no model calls. The resulting
//! analysis drives routing.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// Category of work a prompt asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    CodeReview,
    Debugging,
    CodeGeneration,
    Refactoring,
    Testing,
    Documentation,
    SecurityAudit,
    Architecture,
    ResearchIntelligence,
    DataHarvesting,
    SecurityOperations,
    General,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeReview => "code_review",
            Self::Debugging => "debugging",
            Self::CodeGeneration => "code_generation",
            Self::Refactoring => "refactoring",
            Self::Testing => "testing",
            Self::Documentation => "documentation",
            Self::SecurityAudit => "security_audit",
            Self::Architecture => "architecture",
            Self::ResearchIntelligence => "research_intelligence",
            Self::DataHarvesting => "data_harvesting",
            Self::SecurityOperations => "security_operations",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Estimated task complexity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
        }
    }
}

impl std::fmt::Display for Complexity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of analyzing a task prompt
#[derive(Debug, Clone, Serialize)]
pub struct TaskAnalysis {
    pub task_type: TaskType,
    pub complexity: Complexity,
    pub tags: Vec<String>,
    pub detected_languages: Vec<String>,
    pub file_scope: usize,
    pub suggested_capabilities: Vec<String>,
    pub confidence: f64,
}

/// Optional context passed alongside the prompt
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub files: Vec<String>,
}

/// Keyword sets for task type detection
const TASK_PATTERNS: &[(TaskType, &[&str])] = &[
    (
        TaskType::CodeReview,
        &[
            "review", "analyze", "check", "audit", "inspect", "look at", "quality", "feedback", "evaluate", "assess",
        ],
    ),
    (
        TaskType::Debugging,
        &[
            "debug",
            "fix",
            "bug",
            "error",
            "issue",
            "problem",
            "crash",
            "broken",
            "failing",
            "exception",
            "traceback",
            "stack trace",
        ],
    ),
    (
        TaskType::CodeGeneration,
        &[
            "write", "create", "implement", "build", "develop", "generate", "add", "make", "construct", "scaffold",
        ],
    ),
    (
        TaskType::Refactoring,
        &[
            "refactor",
            "restructure",
            "reorganize",
            "improve",
            "optimize",
            "clean up",
            "simplify",
            "extract",
            "decompose",
        ],
    ),
    (
        TaskType::Testing,
        &[
            "test",
            "testing",
            "unit test",
            "integration test",
            "pytest",
            "coverage",
            "spec",
            "assertion",
            "mock",
        ],
    ),
    (
        TaskType::Documentation,
        &[
            "document",
            "documentation",
            "docstring",
            "readme",
            "comment",
            "explain",
            "describe",
            "annotate",
        ],
    ),
    (
        TaskType::SecurityAudit,
        &[
            "security",
            "vulnerability",
            "exploit",
            "injection",
            "xss",
            "auth",
            "permission",
            "csrf",
            "owasp",
            "hardening",
        ],
    ),
    (
        TaskType::Architecture,
        &[
            "architecture",
            "design",
            "pattern",
            "structure",
            "diagram",
            "system design",
            "microservice",
            "api design",
            "schema",
        ],
    ),
    (
        TaskType::ResearchIntelligence,
        &[
            "market scan",
            "competitive analysis",
            "market intelligence",
            "technology radar",
            "trend research",
            "trend analysis",
            "insights",
            "research report",
            "competitive landscape",
            "industry analysis",
            "market research",
        ],
    ),
    (
        TaskType::DataHarvesting,
        &[
            "harvest",
            "data collection",
            "data source",
            "data quality",
            "data pipeline",
            "data ingestion",
            "source monitoring",
            "data audit",
            "scrape",
            "crawl",
            "extract data",
        ],
    ),
    (
        TaskType::SecurityOperations,
        &[
            "threat assessment",
            "security scan",
            "compliance audit",
            "security posture",
            "alert management",
            "continuous monitoring",
            "threat detection",
            "incident response",
            "access review",
            "security monitoring",
            "vulnerability scan",
        ],
    ),
];

const SIMPLE_KEYWORDS: &[&str] = &[
    "simple", "quick", "small", "minor", "typo", "rename", "one file", "single", "trivial",
];

const COMPLEX_KEYWORDS: &[&str] = &[
    "complex",
    "architecture",
    "redesign",
    "migrate",
    "entire",
    "all files",
    "multiple files",
    "large",
    "comprehensive",
    "across the codebase",
    "system-wide",
];

static LANGUAGE_PATTERNS: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    let compile = |patterns: &[&str]| {
        patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .expect("valid language pattern")
            })
            .collect()
    };
    vec![
        ("python", compile(&[r"\.py\b", r"\bpython\b", r"\bpytest\b", r"\bdjango\b", r"\bflask\b"])),
        ("javascript", compile(&[r"\.js\b", r"\bjavascript\b", r"\bnode\b", r"\breact\b", r"\bnpm\b"])),
        ("typescript", compile(&[r"\.ts\b", r"\btypescript\b", r"\bangular\b", r"\.tsx\b"])),
        ("rust", compile(&[r"\.rs\b", r"\brust\b", r"\bcargo\b"])),
        ("go", compile(&[r"\.go\b", r"\bgolang\b"])),
        ("java", compile(&[r"\.java\b", r"\bjava\b", r"\bspring\b", r"\bmaven\b"])),
        ("sql", compile(&[r"\bsql\b", r"\bquery\b", r"\bdatabase\b", r"\btable\b"])),
    ]
});

static FILE_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\w./\\-]+\.(?:py|js|ts|go|rs|java)\b").expect("valid path pattern"));

/// Analyzes task prompts to determine routing requirements
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskAnalyzer;

impl TaskAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Analyze a prompt and return a structured analysis
    pub fn analyze(&self, prompt: &str, context: Option<&AnalysisContext>) -> TaskAnalysis {
        let prompt_lower = prompt.to_lowercase();

        let (task_type, confidence) = detect_task_type(&prompt_lower);
        let complexity = detect_complexity(&prompt_lower, context);
        let languages = detect_languages(prompt);
        let file_scope = estimate_file_scope(&prompt_lower, context);

        let tags: Vec<String> = base_tags(task_type).iter().map(|t| t.to_string()).collect();

        let mut capabilities = tags.clone();
        capabilities.extend(languages.iter().cloned());
        if complexity == Complexity::Complex {
            capabilities.push("architecture".to_string());
        }

        TaskAnalysis {
            task_type,
            complexity,
            tags,
            detected_languages: languages,
            file_scope,
            suggested_capabilities: capabilities,
            confidence,
        }
    }
}

fn detect_task_type(prompt_lower: &str) -> (TaskType, f64) {
    let mut best: Option<(TaskType, usize, usize)> = None;

    for (task_type, keywords) in TASK_PATTERNS {
        let score = keywords.iter().filter(|kw| prompt_lower.contains(*kw)).count();
        if score > 0 && best.is_none_or(|(_, best_score, _)| score > best_score) {
            best = Some((*task_type, score, keywords.len()));
        }
    }

    match best {
        Some((task_type, score, total)) => {
            let confidence = (score as f64 / (total as f64 * 0.3).max(1.0)).min(1.0);
            (task_type, confidence)
        }
        None => (TaskType::General, 0.3),
    }
}

fn detect_complexity(prompt_lower: &str, context: Option<&AnalysisContext>) -> Complexity {
    if COMPLEX_KEYWORDS.iter().any(|kw| prompt_lower.contains(kw)) {
        return Complexity::Complex;
    }
    if SIMPLE_KEYWORDS.iter().any(|kw| prompt_lower.contains(kw)) {
        return Complexity::Simple;
    }

    let file_count = context.map(|c| c.files.len()).unwrap_or(0);
    if file_count > 5 {
        return Complexity::Complex;
    }
    if file_count > 2 {
        return Complexity::Moderate;
    }

    if prompt_lower.len() > 500 {
        return Complexity::Complex;
    }
    if prompt_lower.len() < 100 {
        return Complexity::Simple;
    }
    Complexity::Moderate
}

fn detect_languages(prompt: &str) -> Vec<String> {
    LANGUAGE_PATTERNS
        .iter()
        .filter(|(_, patterns)| patterns.iter().any(|p| p.is_match(prompt)))
        .map(|(lang, _)| lang.to_string())
        .collect()
}

fn estimate_file_scope(prompt_lower: &str, context: Option<&AnalysisContext>) -> usize {
    if let Some(ctx) = context
        && !ctx.files.is_empty()
    {
        return ctx.files.len();
    }

    if ["entire", "all files", "codebase", "whole project"].iter().any(|w| prompt_lower.contains(w)) {
        return 50;
    }
    if ["multiple files", "several files", "across"].iter().any(|w| prompt_lower.contains(w)) {
        return 10;
    }
    if ["this file", "single file", "one file"].iter().any(|w| prompt_lower.contains(w)) {
        return 1;
    }

    let mut paths: Vec<&str> = FILE_PATH_RE.find_iter(prompt_lower).map(|m| m.as_str()).collect();
    paths.sort_unstable();
    paths.dedup();
    paths.len().max(1)
}

fn base_tags(task_type: TaskType) -> &'static [&'static str] {
    match task_type {
        TaskType::CodeReview => &["code_review"],
        TaskType::Debugging => &["debugging"],
        TaskType::CodeGeneration => &["code_generation"],
        TaskType::Refactoring => &["refactoring"],
        TaskType::Testing => &["testing"],
        TaskType::Documentation => &["documentation"],
        TaskType::SecurityAudit => &["security_audit"],
        TaskType::Architecture => &["architecture"],
        TaskType::ResearchIntelligence => &["research_intelligence", "research", "strategic_planning"],
        TaskType::DataHarvesting => &["data_harvesting", "data_governance", "operational_planning"],
        TaskType::SecurityOperations => &["security_operations", "security_audit", "compliance", "risk_assessment"],
        TaskType::General => &["general"],
    }
}
