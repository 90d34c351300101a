//! Classifier collaborator: request/response contract and implementations.
//!
//! A classifier answers with a single line, either
//!
//! ```text
//! keyword|stance|refined text
//! ```
//!
//! or the rejection token [`REJECTION_TOKEN`], optionally followed by
//! `: reason`. The engine never trusts that shape: every answer goes through
//! [`decode_response`] before it can touch the store.

use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::TopicContext;
use crate::error::{ClassifierError, ParseError};
use crate::model::Candidate;
use crate::normalize_text;

/// Literal answer meaning "off-topic or noise".
pub const REJECTION_TOKEN: &str = "IRRELEVANT";

const FIELD_DELIMITER: char = '|';

/// Everything a classifier gets to see for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyRequest {
    pub topic: TopicContext,
    pub text: String,
    /// Keywords already on the map, offered for reuse.
    pub keyword_hints: Vec<String>,
}

/// Turns raw opinion text into a raw, undecoded answer.
///
/// Implementations are stateless from the engine's point of view and are
/// never retried automatically.
pub trait Classifier {
    fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifierError>;
}

impl<F> Classifier for F
where
    F: Fn(&ClassifyRequest) -> Result<String, ClassifierError>,
{
    fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifierError> {
        self(request)
    }
}

/// A decoded classifier answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Candidate(Candidate),
    Rejected(String),
}

/// Strictly decode a raw classifier answer.
///
/// Surrounding whitespace, code fences and one layer of quotes are ignored,
/// and only the first remaining non-empty line is read. A numeric stance is
/// clamped into [-1, 1]; anything else that does not fit the three-field shape
/// is a [`ParseError`]. The candidate's civility starts at 1.0; the engine
/// rates the original text afterwards.
///
/// # Example
/// ```
/// use opinion_garden::{Decoded, decode_response};
///
/// let d = decode_response("\"privacy|disagree|Age checks over-collect personal data.\"", "lol no", 32).unwrap();
/// match d {
///     Decoded::Candidate(c) => {
///         assert_eq!(c.keyword, "privacy");
///         assert_eq!(c.polarity, -1.0);
///         assert_eq!(c.original_text, "lol no");
///     }
///     Decoded::Rejected(_) => unreachable!(),
/// }
/// assert!(decode_response("just some prose", "x", 32).is_err());
/// ```
pub fn decode_response(
    raw: &str,
    original: &str,
    max_keyword_chars: usize,
) -> Result<Decoded, ParseError> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with("```"))
        .map(strip_quotes)
        .ok_or(ParseError::Empty)?;
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    if let Some(reason) = rejection_reason(line) {
        return Ok(Decoded::Rejected(reason));
    }

    let fields: Vec<&str> = line.splitn(3, FIELD_DELIMITER).map(str::trim).collect();
    if fields.len() < 3 {
        return Err(ParseError::MissingFields {
            found: fields.len(),
        });
    }
    let (keyword, stance, refined) = (fields[0], fields[1], fields[2]);
    for (name, value) in [("keyword", keyword), ("stance", stance), ("refined_text", refined)] {
        if value.is_empty() {
            return Err(ParseError::EmptyField(name));
        }
    }

    let len = keyword.chars().count();
    if len > max_keyword_chars {
        return Err(ParseError::KeywordTooLong {
            len,
            max: max_keyword_chars,
        });
    }

    Ok(Decoded::Candidate(Candidate {
        keyword: keyword.to_string(),
        polarity: parse_stance(stance)?,
        refined_text: refined.to_string(),
        original_text: original.to_string(),
        civility: 1.0,
    }))
}

fn strip_quotes(line: &str) -> &str {
    for q in ['"', '\'', '`', '“'] {
        let close = if q == '“' { '”' } else { q };
        if line.len() >= 2 && line.starts_with(q) && line.ends_with(close) {
            return line[q.len_utf8()..line.len() - close.len_utf8()].trim();
        }
    }
    line
}

fn rejection_reason(line: &str) -> Option<String> {
    let head = line.get(..REJECTION_TOKEN.len())?;
    if !head.eq_ignore_ascii_case(REJECTION_TOKEN) {
        return None;
    }
    // tolerate "IRRELEVANT." and "IRRELEVANT!"
    let rest = line[REJECTION_TOKEN.len()..]
        .trim_start()
        .trim_start_matches(['.', '!'])
        .trim();
    if rest.is_empty() {
        return Some("off-topic".to_string());
    }
    let reason = rest.strip_prefix(':')?.trim();
    Some(if reason.is_empty() { "off-topic" } else { reason }.to_string())
}

/// Parse a stance field into a polarity in [-1, 1].
pub fn parse_stance(field: &str) -> Result<f64, ParseError> {
    if let Ok(v) = field.parse::<f64>() {
        if !v.is_finite() {
            return Err(ParseError::InvalidStance(field.to_string()));
        }
        let clamped = v.clamp(-1.0, 1.0);
        if clamped != v {
            debug!("stance {v} clamped to {clamped}");
        }
        return Ok(clamped);
    }
    match field.to_lowercase().as_str() {
        "찬성" | "agree" | "support" | "pro" | "+" => Ok(1.0),
        "반대" | "disagree" | "oppose" | "con" | "-" => Ok(-1.0),
        "중립" | "neutral" | "mixed" => Ok(0.0),
        _ => Err(ParseError::InvalidStance(field.to_string())),
    }
}

/// System prompt for LLM-backed classifiers.
pub fn build_system_prompt(topic: &TopicContext, keyword_hints: &[String]) -> String {
    let mut prompt = format!(
        "You are a mediation assistant for a public deliberation about: {title}\n\
         Background: {description}\n\n\
         For the user's opinion:\n\
         1. Assign a short category keyword (a few words).\n\
         2. Give its stance toward the policy: 찬성, 반대 or 중립, or a number from -1 to 1.\n\
         3. Rewrite it as one formal, cooperative sentence in the user's language, keeping its position.\n\n\
         Answer with exactly one line: keyword{d}stance{d}refined sentence\n\
         If the opinion is unrelated to the topic or is pure noise, answer exactly: {reject}\n",
        title = topic.title,
        description = topic.description,
        d = FIELD_DELIMITER,
        reject = REJECTION_TOKEN,
    );
    if !keyword_hints.is_empty() {
        prompt.push_str("\nReuse one of these existing keywords when it fits: ");
        prompt.push_str(&keyword_hints.join(", "));
        prompt.push('\n');
    }
    prompt
}

// ---- Offline lexicon classifier ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexiconTopic {
    pub keyword: String,
    pub cues: Vec<String>,
}

/// Cue words for the offline classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lexicon {
    pub topics: Vec<LexiconTopic>,
    #[serde(default)]
    pub agree: Vec<String>,
    #[serde(default)]
    pub disagree: Vec<String>,
}

fn words(xs: &[&str]) -> Vec<String> {
    xs.iter().map(|s| s.to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            topics: vec![
                LexiconTopic {
                    keyword: "실효성 및 기술".into(),
                    cues: words(&[
                        "vpn", "우회", "차단", "실효성", "기술", "불가능", "교육", "리터러시", "bypass",
                    ]),
                },
                LexiconTopic {
                    keyword: "보호 및 규제 필요성".into(),
                    cues: words(&[
                        "보호", "중독", "규제", "금지", "알고리즘", "정신건강", "유해", "틱톡", "addict",
                    ]),
                },
                LexiconTopic {
                    keyword: "프라이버시/기본권".into(),
                    cues: words(&[
                        "개인정보", "프라이버시", "기본권", "권리", "자율", "부모", "자기결정", "privacy",
                    ]),
                },
            ],
            agree: words(&["찬성", "필요", "공감", "해야", "agree", "support"]),
            disagree: words(&[
                "반대", "무의미", "불가능", "침해", "소용없", "미쳤", "disagree", "oppose",
            ]),
        }
    }
}

impl Lexicon {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Number of cues found in already normalized `text`.
pub(crate) fn cue_hits(text: &str, cues: &[String]) -> usize {
    cues.iter()
        .map(|c| normalize_text(c))
        .filter(|c| !c.is_empty() && text.contains(c.as_str()))
        .count()
}

/// Deterministic, offline classifier driven by cue words.
///
/// Picks the topic with the most cue hits (earliest topic on ties), derives
/// the stance from agree/disagree cues and uses the tidied input as the
/// refined text. Input without any topic cue is rejected.
#[derive(Debug, Clone, Default)]
pub struct LexiconClassifier {
    lexicon: Lexicon,
}

impl LexiconClassifier {
    pub fn new(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }
}

impl Classifier for LexiconClassifier {
    fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifierError> {
        let norm = normalize_text(&request.text);
        let mut best: Option<(&str, usize)> = None;
        for topic in &self.lexicon.topics {
            let hits = cue_hits(&norm, &topic.cues);
            if hits > 0 && best.is_none_or(|(_, b)| hits > b) {
                best = Some((topic.keyword.as_str(), hits));
            }
        }
        let Some((keyword, _)) = best else {
            return Ok(format!("{REJECTION_TOKEN}: no topic cue found"));
        };

        let agree = cue_hits(&norm, &self.lexicon.agree);
        let disagree = cue_hits(&norm, &self.lexicon.disagree);
        let stance = match agree.cmp(&disagree) {
            std::cmp::Ordering::Greater => "찬성",
            std::cmp::Ordering::Less => "반대",
            std::cmp::Ordering::Equal => "중립",
        };

        let mut refined = request.text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !refined.ends_with(['.', '!', '?']) {
            refined.push('.');
        }
        Ok(format!("{keyword}{FIELD_DELIMITER}{stance}{FIELD_DELIMITER}{refined}"))
    }
}

// ---- OpenAI-compatible chat classifier ----

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Classifier backed by an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatClassifier {
    client: reqwest::blocking::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl ChatClassifier {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1/chat/completions";
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-mini";

    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClassifierError::Unavailable(format!("building HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    fn request_body(&self, request: &ClassifyRequest) -> ChatRequest<'_> {
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: build_system_prompt(&request.topic, &request.keyword_hints),
                },
                ChatMessage {
                    role: "user".into(),
                    content: request.text.clone(),
                },
            ],
            temperature: 0.0,
        }
    }
}

fn first_choice(resp: ChatResponse) -> Result<String, ClassifierError> {
    resp.choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| ClassifierError::Unavailable("response contained no choices".into()))
}

impl Classifier for ChatClassifier {
    fn classify(&self, request: &ClassifyRequest) -> Result<String, ClassifierError> {
        let unavailable = |e: reqwest::Error| {
            warn!("chat classifier request failed: {e}");
            ClassifierError::Unavailable(e.to_string())
        };
        let resp: ChatResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(request))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(unavailable)?;
        first_choice(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(d: Decoded) -> Candidate {
        match d {
            Decoded::Candidate(c) => c,
            Decoded::Rejected(r) => panic!("unexpected rejection: {r}"),
        }
    }

    fn request(text: &str) -> ClassifyRequest {
        ClassifyRequest {
            topic: TopicContext::default(),
            text: text.to_string(),
            keyword_hints: Vec::new(),
        }
    }

    #[test]
    fn decodes_three_fields_and_keeps_extra_pipes() {
        let c = candidate(decode_response("기술|반대|A | B 모두 불가능합니다", "orig", 32).unwrap());
        assert_eq!(c.keyword, "기술");
        assert_eq!(c.polarity, -1.0);
        assert_eq!(c.refined_text, "A | B 모두 불가능합니다");
    }

    #[test]
    fn decodes_first_line_inside_fences() {
        let raw = "```\n`privacy|0.25|Data minimization matters.`\nextra chatter\n```";
        let c = candidate(decode_response(raw, "o", 32).unwrap());
        assert_eq!(c.keyword, "privacy");
        assert_eq!(c.polarity, 0.25);
    }

    #[test]
    fn numeric_stance_is_clamped_but_nan_rejected() {
        assert_eq!(parse_stance("7").unwrap(), 1.0);
        assert_eq!(parse_stance("-2.5").unwrap(), -1.0);
        assert!(matches!(parse_stance("NaN"), Err(ParseError::InvalidStance(_))));
        assert!(matches!(parse_stance("inf"), Err(ParseError::InvalidStance(_))));
        assert!(matches!(parse_stance("..."), Err(ParseError::InvalidStance(_))));
        assert_eq!(parse_stance("Neutral").unwrap(), 0.0);
    }

    #[test]
    fn malformed_responses_are_parse_errors() {
        assert_eq!(decode_response("   \n ", "o", 32), Err(ParseError::Empty));
        assert_eq!(
            decode_response("keyword only", "o", 32),
            Err(ParseError::MissingFields { found: 1 })
        );
        assert_eq!(
            decode_response("k|찬성", "o", 32),
            Err(ParseError::MissingFields { found: 2 })
        );
        assert_eq!(
            decode_response("k| |text", "o", 32),
            Err(ParseError::EmptyField("stance"))
        );
        assert_eq!(
            decode_response("abcdef|찬성|text", "o", 5),
            Err(ParseError::KeywordTooLong { len: 6, max: 5 })
        );
    }

    #[test]
    fn rejection_token_variants() {
        assert_eq!(
            decode_response("IRRELEVANT", "o", 32),
            Ok(Decoded::Rejected("off-topic".into()))
        );
        assert_eq!(
            decode_response("  \"irrelevant: small talk\" ", "o", 32),
            Ok(Decoded::Rejected("small talk".into()))
        );
        for punctuated in ["IRRELEVANT.", "irrelevant!", "Irrelevant ..."] {
            assert_eq!(
                decode_response(punctuated, "o", 32),
                Ok(Decoded::Rejected("off-topic".into()))
            );
        }
        assert_eq!(
            decode_response("IRRELEVANT.: weather", "o", 32),
            Ok(Decoded::Rejected("weather".into()))
        );
        // a keyword that merely starts with the token is not a rejection
        let c = candidate(decode_response("IRRELEVANTLY|찬성|text", "o", 32).unwrap());
        assert_eq!(c.keyword, "IRRELEVANTLY");
    }

    #[test]
    fn prompt_mentions_topic_and_hints() {
        let topic = TopicContext::default();
        let p = build_system_prompt(&topic, &["기술".to_string(), "보호".to_string()]);
        assert!(p.contains(&topic.title));
        assert!(p.contains("기술, 보호"));
        assert!(p.contains(REJECTION_TOKEN));
        assert!(!build_system_prompt(&topic, &[]).contains("Reuse"));
    }

    #[test]
    fn lexicon_classifies_rejects_and_refines() {
        let clf = LexiconClassifier::default();
        let raw = clf.classify(&request("VPN 우회로   차단은 무의미하다")).unwrap();
        assert_eq!(raw, "실효성 및 기술|반대|VPN 우회로 차단은 무의미하다.");

        let raw = clf.classify(&request("오늘 날씨 좋네요")).unwrap();
        assert!(matches!(decode_response(&raw, "x", 32), Ok(Decoded::Rejected(_))));

        let raw = clf
            .classify(&request("알고리즘 중독 심각함. 규제 찬성!"))
            .unwrap();
        let c = candidate(decode_response(&raw, "x", 32).unwrap());
        assert_eq!(c.keyword, "보호 및 규제 필요성");
        assert_eq!(c.polarity, 1.0);
    }

    #[test]
    fn lexicon_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lexicon.json");
        fs::write(
            &path,
            r#"{ "topics": [ { "keyword": "transit", "cues": ["bus", "train"] } ] }"#,
        )
        .unwrap();
        let clf = LexiconClassifier::new(Lexicon::from_json_file(&path).unwrap());
        assert_eq!(
            clf.classify(&request("More night buses")).unwrap(),
            "transit|중립|More night buses."
        );
    }

    #[test]
    fn chat_request_body_and_response_shape() {
        let clf = ChatClassifier::new(
            "key",
            ChatClassifier::DEFAULT_MODEL,
            ChatClassifier::DEFAULT_ENDPOINT,
            Duration::from_secs(5),
        )
        .unwrap();
        let body = serde_json::to_value(clf.request_body(&request("틱톡 금지 찬성"))).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "틱톡 금지 찬성");

        let resp: ChatResponse = serde_json::from_str(
            r#"{ "choices": [ { "message": { "role": "assistant", "content": "a|찬성|b" } } ] }"#,
        )
        .unwrap();
        assert_eq!(first_choice(resp).unwrap(), "a|찬성|b");

        let empty: ChatResponse = serde_json::from_str(r#"{ "choices": [] }"#).unwrap();
        assert!(matches!(first_choice(empty), Err(ClassifierError::Unavailable(_))));
    }
}
