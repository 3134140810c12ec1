//! Prompts for the scoring service.
//!
//! Each request is a fixed system prompt followed by one user message carrying
//! the rubric and the serialized content. The system prompts never vary, so
//! the provider's prompt cache can serve them; only the user message changes.
//!
//! Every prompt asks for a JSON object. [`crate::judgment`] also accepts a bare
//! number for the score-only rubrics.

use docscore_core::{Block, CitationSet, Correction, EvaluatorKind};

use crate::providers::ChatMessage;

/// Base system prompt shared by every evaluator.
pub const BASE_SYSTEM_PROMPT: &str = r#"
You are a scoring service for AI-generated documents.

You score the content you are given against the rubric you are given.
You do not invent criteria.
You do not rewrite content unless you are explicitly asked for a correction.

## Output Rules
1. Return ONLY a JSON object in the requested format
2. Scores are floats between 0.0 and 1.0
3. "confidence" is how sure you are of the score, between 0.0 and 1.0
4. If you cannot judge the content, return a low confidence rather than guessing
"#;

pub const ACCURACY_SYSTEM_PROMPT: &str = "You are an expert evaluator of factual accuracy in text.";

pub const CORRECTION_SYSTEM_PROMPT: &str =
    "You are an expert at correcting factual inaccuracies in content while maintaining citation integrity.";

pub const RELEVANCE_COHERENCE_SYSTEM_PROMPT: &str =
    "You are an expert evaluator of how well a document answers a query and how well it reads.";

pub const BIAS_SYSTEM_PROMPT: &str = "You are an expert in analyzing gender bias in text.";

/// Rubric for metric blocks.
pub const METRIC_RUBRIC: &str = r#"
## Evaluation Methodology
1. Value Accuracy
   - Match the exact metric value against the evidence
   - Verify all significant digits and unit conversions
2. Description Precision
   - Match the description against the source data
   - Verify temporal and statistical qualifiers
3. Contextual Alignment
   - Check that timeframe and scope match the query

## Scoring Rubric
0.81-1.00: Excellent. Value matches the source within 1%, description complete, strong citation support
0.61-0.80: Good. Value within 5%, minor qualifiers missing, citations support most claims
0.41-0.60: Acceptable. Value within 10-15%, important qualifiers missing, partial support
0.21-0.40: Problematic. Value off by 15-25%, description misrepresents key aspects
0.00-0.20: Critical. Value off by more than 25% or wrong, missing or irrelevant citations
"#;

/// Rubric for table blocks.
pub const TABLE_RUBRIC: &str = r#"
## Evaluation Methodology
1. Cell Accuracy
   - Match each value against the source, including units and significant digits
2. Structural Correctness
   - Validate column and row headers, data relationships and groupings
3. Completeness
   - Check for missing values and valid data ranges

## Scoring Rubric
0.81-1.00: Excellent. 95%+ of cells match the source, headers precise, no gaps
0.61-0.80: Good. 85-94% of cells within 5%, minor gaps in non-critical areas
0.41-0.60: Acceptable. 70-84% of cells within 10%, some header ambiguity
0.21-0.40: Problematic. 50-69% of cells accurate, misleading headers, significant gaps
0.00-0.20: Critical. Under 50% of cells accurate, headers missing or wrong
"#;

pub const ACCURACY_OUTPUT_FORMAT: &str = r#"
## Output Format (JSON)
{
  "score": <float 0.0-1.0>,
  "confidence": <float 0.0-1.0>,
  "rationale": "<one sentence>"
}
"#;

pub const RELEVANCE_COHERENCE_RUBRIC: &str = r#"
## Relevance
How completely and directly the document answers the query.
0.0-0.2: Irrelevant or misleading
0.3-0.4: Superficially addresses the query, notable gaps
0.5-0.6: Partially addresses the query, basic but incomplete coverage
0.7-0.8: Comprehensively addresses the query with minor gaps
0.9-1.0: Addresses every aspect of the query with depth and clarity

## Coherence
How well consecutive blocks connect into one logical flow.
0.0-0.2: Disconnected ideas, jarring transitions
0.3-0.4: Minimal connection, significant gaps in flow
0.5-0.6: Functional transitions, some gaps
0.7-0.8: Clear connection, smooth transitions, minor gaps
0.9-1.0: Seamless flow throughout

## Output Format (JSON)
{
  "relevance": <float 0.0-1.0>,
  "coherence": <float 0.0-1.0>,
  "confidence": <float 0.0-1.0>
}
"#;

pub const BIAS_OUTPUT_FORMAT: &str = r#"
## Output Format (JSON)
{
  "statistics": {
    "gender_distribution": {"male_references": <int>, "female_references": <int>},
    "professional_roles": {"male_associations": <int>, "female_associations": <int>}
  },
  "analysis": {
    "key_findings": [<str>],
    "notable_examples": [{"context": <str>, "bias_type": <str>, "explanation": <str>}],
    "bias_patterns": [<str>]
  },
  "feedback": {
    "strengths": [<str>],
    "areas_for_improvement": [<str>],
    "specific_recommendations": [<str>]
  },
  "bias_score": <float 0.0-1.0, where 1.0 indicates strong bias>,
  "confidence": <float 0.0-1.0>
}

Score 0.0 when the text contains no gendered references at all.
"#;

/// Accuracy judgment for one metric or table block.
pub fn accuracy_messages(query: &str, block: &Block, citations: &CitationSet) -> Vec<ChatMessage> {
    let rubric = match block {
        Block::Table { .. } => TABLE_RUBRIC,
        _ => METRIC_RUBRIC,
    };

    let user = format!(
        "Task: Evaluate the accuracy of the following {kind} in the given context.\n\n\
         ## Content To Evaluate\n\
         Context: {query}\n\
         {content}\n\n\
         {citations}\n\
         {rubric}\n\
         {format}",
        kind = block.kind().as_str(),
        query = query,
        content = render_block(block),
        citations = render_citations(citations),
        rubric = rubric,
        format = ACCURACY_OUTPUT_FORMAT,
    );

    vec![
        ChatMessage::system(format!("{}\n{}", ACCURACY_SYSTEM_PROMPT, BASE_SYSTEM_PROMPT)),
        ChatMessage::user(user),
    ]
}

/// Replacement content for a block that scored poorly.
///
/// A retry carries the rejected previous attempt so the request differs from
/// the first one.
pub fn correction_messages(
    query: &str,
    block: &Block,
    citations: &CitationSet,
    score: f64,
    previous: Option<&Correction>,
) -> Vec<ChatMessage> {
    let (guidelines, format) = match block {
        Block::Table { .. } => (
            "2. Preserve the table structure: same header row, every row the same width\n\
             3. Correct any numerical inaccuracies\n\
             4. Keep headers clear and precise",
            r#"{"rows": [["header", "..."], ["cell", "..."]]}"#,
        ),
        _ => (
            "2. Include all necessary qualifiers (temporal, statistical, geographic)\n\
             3. Use precise language and specific values\n\
             4. Keep the same basic format",
            r#"{"number": "corrected value", "description": "corrected description"}"#,
        ),
    };

    let previous = previous.map(render_previous).unwrap_or_default();

    let user = format!(
        "Task: Correct the following {kind} to improve its accuracy. It scored {score:.2}.\n\n\
         ## Original Content\n\
         Context: {query}\n\
         {content}\n\n\
         {citations}\n\n\
         {previous}\
         ## Correction Guidelines\n\
         1. Maintain exact alignment with the citation content\n\
         {guidelines}\n\n\
         ## Output Format (JSON)\n\
         {format}\n\
         Return ONLY the JSON object.",
        kind = block.kind().as_str(),
        score = score,
        query = query,
        content = render_block(block),
        citations = render_citations(citations),
        previous = previous,
        guidelines = guidelines,
        format = format,
    );

    vec![
        ChatMessage::system(format!("{}\n{}", CORRECTION_SYSTEM_PROMPT, BASE_SYSTEM_PROMPT)),
        ChatMessage::user(user),
    ]
}

/// Relevance and coherence of the whole document, in one request.
pub fn relevance_coherence_messages(query: &str, document: &str) -> Vec<ChatMessage> {
    let user = format!(
        "Task: Evaluate the following complete response against the query.\n\n\
         ## Content To Evaluate\n\
         Query: {query}\n\
         Complete Response:\n{document}\n\
         {rubric}",
        query = query,
        document = document,
        rubric = RELEVANCE_COHERENCE_RUBRIC,
    );

    vec![
        ChatMessage::system(format!("{}\n{}", RELEVANCE_COHERENCE_SYSTEM_PROMPT, BASE_SYSTEM_PROMPT)),
        ChatMessage::user(user),
    ]
}

/// Holistic gender-bias judgment over the document's prose.
pub fn bias_messages(query: &str, text: &str) -> Vec<ChatMessage> {
    let user = format!(
        "Analyze the following text for gender bias. Focus on gender representation, \
         associations between genders and professional roles, and gendered generic terms.\n\n\
         Query the text answers: {query}\n\
         Text to analyze:\n{text}\n\
         {format}",
        query = query,
        text = text,
        format = BIAS_OUTPUT_FORMAT,
    );

    vec![
        ChatMessage::system(format!("{}\n{}", BIAS_SYSTEM_PROMPT, BASE_SYSTEM_PROMPT)),
        ChatMessage::user(user),
    ]
}

/// The system prompt an evaluator's requests start with.
pub fn system_prompt(evaluator: EvaluatorKind) -> &'static str {
    match evaluator {
        EvaluatorKind::Bias => BIAS_SYSTEM_PROMPT,
        EvaluatorKind::Accuracy => ACCURACY_SYSTEM_PROMPT,
        EvaluatorKind::RelevanceCoherence => RELEVANCE_COHERENCE_SYSTEM_PROMPT,
    }
}

fn render_block(block: &Block) -> String {
    match block {
        Block::Metric { number, description } => {
            format!("Metric: {}\nDescription: {}", number, description)
        }
        Block::Table { rows } => {
            let table = serde_json::to_string_pretty(rows).unwrap_or_else(|_| block.render_text());
            format!("Table:\n{}", table)
        }
        other => other.render_text(),
    }
}

fn render_previous(previous: &Correction) -> String {
    let mut out = format!("## Rejected Attempt {}\n", previous.attempt);
    if let Some(proposed) = &previous.proposed {
        out.push_str(&render_block(proposed));
        out.push('\n');
    }
    if let Some(rescore) = previous.reevaluation.as_ref().and_then(|s| s.value()) {
        out.push_str(&format!("It re-scored {:.2}.\n", rescore));
    }
    if let Some(note) = &previous.note {
        out.push_str(&format!("Reason: {}\n", note));
    }
    out.push_str("Propose a different correction.\n\n");
    out
}

fn render_citations(citations: &CitationSet) -> String {
    match citations {
        CitationSet::Unavailable { reason } => format!("Citations unavailable: {}", reason),
        CitationSet::Available { citations } if citations.is_empty() => "No citations provided".to_string(),
        CitationSet::Available { citations } => {
            let mut out = String::from("Citation Content:");
            for c in citations {
                out.push_str(&format!("\n[{}]: {}", c.reference, c.snippet));
                if let Some(source) = &c.source {
                    out.push_str(&format!(" ({})", source));
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docscore_core::{Citation, CorrectionOutcome, Provenance};

    fn metric() -> Block {
        Block::Metric {
            number: "10 or 11 dimensions".into(),
            description: "Dimensions required by string theory".into(),
        }
    }

    #[test]
    fn test_system_prompts_share_base() {
        for messages in [
            accuracy_messages("q", &metric(), &CitationSet::empty()),
            bias_messages("q", "text"),
            relevance_coherence_messages("q", "doc"),
        ] {
            assert_eq!(messages[0].role, "system");
            assert!(messages[0].content.contains("Return ONLY a JSON object"));
        }
    }

    #[test]
    fn test_accuracy_prompt_selects_rubric() {
        let metric_prompt = &accuracy_messages("q", &metric(), &CitationSet::empty())[1].content;
        assert!(metric_prompt.contains("Metric: 10 or 11 dimensions"));
        assert!(metric_prompt.contains("Value Accuracy"));

        let table = Block::Table {
            rows: vec![vec!["Theory".into(), "Dims".into()], vec!["M-theory".into(), "11".into()]],
        };
        let table_prompt = &accuracy_messages("q", &table, &CitationSet::empty())[1].content;
        assert!(table_prompt.contains("Cell Accuracy"));
        assert!(table_prompt.contains("\"M-theory\""));
    }

    #[test]
    fn test_citation_states_render_distinctly() {
        let empty = &accuracy_messages("q", &metric(), &CitationSet::empty())[1].content;
        assert!(empty.contains("No citations provided"));

        let missing = &accuracy_messages("q", &metric(), &CitationSet::unavailable("not exposed"))[1].content;
        assert!(missing.contains("Citations unavailable: not exposed"));

        let set = CitationSet::Available {
            citations: vec![Citation::new("1", "Ten dimensions.", Provenance::DocumentTable).with_source("arxiv.org")],
        };
        let present = &accuracy_messages("q", &metric(), &set)[1].content;
        assert!(present.contains("[1]: Ten dimensions. (arxiv.org)"));
    }

    #[test]
    fn test_correction_prompt_names_output_fields() {
        let prompt = &correction_messages("q", &metric(), &CitationSet::empty(), 0.3, None)[1].content;
        assert!(prompt.contains("scored 0.30"));
        assert!(prompt.contains("\"number\""));
        assert!(prompt.contains("\"description\""));
        assert!(!prompt.contains("Rejected Attempt"));
    }

    #[test]
    fn test_retry_prompt_carries_previous_attempt() {
        let previous = Correction {
            attempt: 1,
            original: metric(),
            proposed: Some(Block::Metric {
                number: "12 dimensions".into(),
                description: "Dimensions".into(),
            }),
            reevaluation: None,
            outcome: CorrectionOutcome::Rejected,
            note: Some("re-score 0.30 did not improve on 0.30".into()),
        };
        let first = correction_messages("q", &metric(), &CitationSet::empty(), 0.3, None);
        let retry = correction_messages("q", &metric(), &CitationSet::empty(), 0.3, Some(&previous));
        assert_ne!(first, retry);
        assert!(retry[1].content.contains("Rejected Attempt 1"));
        assert!(retry[1].content.contains("Metric: 12 dimensions"));
        assert!(retry[1].content.contains("did not improve"));
    }

    #[test]
    fn test_bias_prompt_requests_zero_for_no_references() {
        let prompt = &bias_messages("q", "The sky is blue.")[1].content;
        assert!(prompt.contains("bias_score"));
        assert!(prompt.contains("no gendered references"));
    }
}
