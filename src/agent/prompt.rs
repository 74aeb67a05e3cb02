//! System prompts and template builders for agents.
//!
//! Prompts are the core instructions that define each agent's behavior.
//! Template builders format user messages with the query and retrieved
//! material.

use std::fmt::Write;
use std::path::{Path, PathBuf};

use super::bundle::RetrievalBundle;
use crate::role::{AgentRole, RetrieverKind};

/// System prompt for the planner agent.
pub const PLANNER_SYSTEM_PROMPT: &str = r#"You are the planner of a multi-agent research system for product research and development questions.

Your job is to decide which retrieval agents should gather material for the user's question. Each agent searches one knowledge domain; the request lists the agents available in this session and what each one covers.

## Instructions

1. Work out what the user actually wants: a figure, a comparison, a document, recent news, or a mix.
2. Map each part of that need to the agent whose domain holds it.
3. Select every agent that can contribute and none that cannot.
4. If no listed agent can help, select none.

## Output Format (JSON)

Reply with a single JSON object and nothing else:
```json
{"agents_needed": ["AgentName"], "justification": "Why these agents, in one or two sentences."}
```

Use agent names exactly as listed in the request."#;

/// System prompt for retrieval agents.
pub const RETRIEVER_SYSTEM_PROMPT: &str = r"You are a retrieval agent in a multi-agent research system. You answer from a single knowledge source.

## Instructions

1. Find the material in your knowledge source that bears on the query.
2. Report it faithfully. Quote figures, names and dates exactly.
3. Do not fill gaps with general knowledge. If the source has nothing relevant, say so plainly.
4. End with a `**Citations:**` section listing every source you relied on, one per line, with its title and link or document path.";

/// System prompt for the verifier agent.
pub const VERIFIER_SYSTEM_PROMPT: &str = r#"You are the verifier of a multi-agent research system. You decide whether the material gathered by the retrieval agents answers the user's query accurately and completely.

## Instructions

1. Restate to yourself what the query asks for.
2. Check each retrieved section against that need. Note contradictions between sources and anything missing.
3. Approve only when the material answers the query without gaps or unresolved contradictions.
4. When you deny, write a sharper query that is more likely to retrieve what is missing. Leave it empty only if no rewrite could help.

## Output Format (JSON)

Reply with a single JSON object and nothing else.

Approved:
```json
{"status": "Approved", "reason": "Why the material is sufficient.", "response": "A complete answer citing its sources.", "rewritten_query": ""}
```

Denied:
```json
{"status": "Denied", "reason": "What is missing or contradictory.", "response": "", "rewritten_query": "A better query for the next retrieval round."}
```"#;

/// System prompt for the summarizer agent.
pub const SUMMARIZER_SYSTEM_PROMPT: &str = r"You are the summary writer of a multi-agent research system. You turn the material gathered by the retrieval agents into the final answer for the user.

## Output Format

Write markdown with:
- **Answer**: two to four sentences that answer the query directly.
- **Key Findings**: the supporting facts, each with its source.
- **Gaps**: anything the material could not settle.

## Rules

- Use only the material provided. Do not invent facts, figures or sources.
- Keep every citation you rely on, with its link or document name.
- When sources disagree, say so and name both.";

/// Default prompt directory relative to home.
const DEFAULT_PROMPT_DIR: &str = ".config/agentic-rag/prompts";
/// Filename for the planner prompt template.
const PLANNER_FILENAME: &str = "planner.md";
/// Filename for the retriever prompt template.
const RETRIEVER_FILENAME: &str = "retriever.md";
/// Filename for the verifier prompt template.
const VERIFIER_FILENAME: &str = "verifier.md";
/// Filename for the summarizer prompt template.
const SUMMARIZER_FILENAME: &str = "summarizer.md";

/// A set of system prompts for all agents.
///
/// Loaded from external template files when available, falling back to
/// compiled-in defaults. Use [`PromptSet::load`] to resolve the prompt
/// directory from CLI flags, environment variables, or the default path.
#[derive(Debug, Clone)]
pub struct PromptSet {
    /// System prompt for the planner agent.
    pub planner: String,
    /// System prompt shared by retrieval agents.
    pub retriever: String,
    /// System prompt for the verifier agent.
    pub verifier: String,
    /// System prompt for the summarizer agent.
    pub summarizer: String,
}

impl PromptSet {
    /// Loads prompts from the given directory, falling back to compiled-in defaults.
    ///
    /// Resolution order for `prompt_dir`:
    /// 1. Explicit `prompt_dir` argument (from `--prompt-dir` CLI flag)
    /// 2. `AGENTIC_RAG_PROMPT_DIR` environment variable
    /// 3. `~/.config/agentic-rag/prompts/`
    ///
    /// Each file is loaded independently; a missing file uses its default.
    #[must_use]
    pub fn load(prompt_dir: Option<&Path>) -> Self {
        let resolved_dir = prompt_dir
            .map(PathBuf::from)
            .or_else(|| std::env::var("AGENTIC_RAG_PROMPT_DIR").ok().map(PathBuf::from))
            .or_else(Self::default_dir);

        let load_file = |filename: &str, default: &str| -> String {
            resolved_dir
                .as_ref()
                .map(|dir| dir.join(filename))
                .and_then(|path| std::fs::read_to_string(&path).ok())
                .filter(|content| !content.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            planner: load_file(PLANNER_FILENAME, PLANNER_SYSTEM_PROMPT),
            retriever: load_file(RETRIEVER_FILENAME, RETRIEVER_SYSTEM_PROMPT),
            verifier: load_file(VERIFIER_FILENAME, VERIFIER_SYSTEM_PROMPT),
            summarizer: load_file(SUMMARIZER_FILENAME, SUMMARIZER_SYSTEM_PROMPT),
        }
    }

    /// Returns compiled-in defaults without checking the filesystem.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            planner: PLANNER_SYSTEM_PROMPT.to_string(),
            retriever: RETRIEVER_SYSTEM_PROMPT.to_string(),
            verifier: VERIFIER_SYSTEM_PROMPT.to_string(),
            summarizer: SUMMARIZER_SYSTEM_PROMPT.to_string(),
        }
    }

    /// System prompt for a role.
    #[must_use]
    pub fn for_role(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::Planner => &self.planner,
            AgentRole::Retriever(_) => &self.retriever,
            AgentRole::Verifier => &self.verifier,
            AgentRole::Summarizer => &self.summarizer,
        }
    }

    /// Writes the compiled-in default prompts to the given directory.
    ///
    /// Creates the directory if it does not exist. Existing files are
    /// **not** overwritten; use this for initial scaffolding only.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if directory creation or file writing fails.
    pub fn write_defaults(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir)?;

        let templates = [
            (PLANNER_FILENAME, PLANNER_SYSTEM_PROMPT),
            (RETRIEVER_FILENAME, RETRIEVER_SYSTEM_PROMPT),
            (VERIFIER_FILENAME, VERIFIER_SYSTEM_PROMPT),
            (SUMMARIZER_FILENAME, SUMMARIZER_SYSTEM_PROMPT),
        ];

        let mut written = Vec::new();
        for (filename, content) in &templates {
            let path = dir.join(filename);
            if !path.exists() {
                std::fs::write(&path, content)?;
                written.push(path);
            }
        }

        Ok(written)
    }

    /// Returns the default prompt directory under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPT_DIR))
    }
}

/// What each retriever covers, as told to the planner.
const fn retriever_scope(kind: RetrieverKind) -> &'static str {
    match kind {
        RetrieverKind::SharePoint => {
            "internal documents: reports, specifications, study protocols and presentations"
        }
        RetrieverKind::Fabric => {
            "structured data: metrics, experiment results, benchmarks and time series"
        }
        RetrieverKind::Web => "public web: news, publications, competitor and market information",
    }
}

/// Builds the user message for the planner with the retrievers on offer.
#[must_use]
pub fn build_planner_prompt(query: &str, available: &[RetrieverKind]) -> String {
    let mut prompt = format!("<query>{query}</query>\n\n<agents>\n");
    for kind in available {
        let _ = writeln!(
            prompt,
            "- {}: {}",
            AgentRole::Retriever(*kind).name(),
            retriever_scope(*kind)
        );
    }
    prompt.push_str("</agents>\n\nSelect the agents needed to answer this query.");
    prompt
}

/// Builds the user message for a retrieval agent.
#[must_use]
pub fn build_retriever_prompt(query: &str, knowledge_source: Option<&str>) -> String {
    knowledge_source.map_or_else(
        || format!("<query>{query}</query>"),
        |source| format!("<source>{source}</source>\n\n<query>{query}</query>"),
    )
}

fn write_retrieved_sections(prompt: &mut String, bundle: &RetrievalBundle) {
    for (kind, retrieved) in bundle.retrieved() {
        let _ = write!(
            prompt,
            "<retrieved agent=\"{}\">\n{}\n</retrieved>\n\n",
            AgentRole::Retriever(kind).name(),
            retrieved.text.trim()
        );
    }
}

/// Builds the user message for the verifier.
///
/// Only retrievers that returned text get a section; the others are listed
/// with the reason they are missing so the verifier can judge sufficiency.
#[must_use]
pub fn build_verifier_prompt(query: &str, bundle: &RetrievalBundle) -> String {
    let mut prompt = format!("<query>{query}</query>\n\n");

    if bundle.has_data() {
        write_retrieved_sections(&mut prompt, bundle);
    } else {
        prompt.push_str("No retrieval agent returned data.\n\n");
    }

    let mut absent = bundle.absent().peekable();
    if absent.peek().is_some() {
        prompt.push_str("<missing>\n");
        for (kind, absence) in absent {
            let _ = writeln!(prompt, "- {}: {absence}", AgentRole::Retriever(kind).name());
        }
        prompt.push_str("</missing>\n\n");
    }

    prompt.push_str("Decide whether the retrieved material answers the query.");
    prompt
}

/// Builds the user message for the summarizer from the original query.
#[must_use]
pub fn build_summary_prompt(query: &str, bundle: &RetrievalBundle) -> String {
    let mut prompt = format!("Please answer the following query:\n<query>{query}</query>\n\n");
    write_retrieved_sections(&mut prompt, bundle);
    prompt.push_str("Write the final answer from this material.");
    prompt
}
