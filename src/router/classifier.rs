//! Keyword classifier.
//!
//! Every agent has a vocabulary of phrases. Phrases match whole token
//! sequences of the folded message, so accented and unaccented Vietnamese
//! behave the same. A phrase weighs its non-whitespace character count plus 3
//! for each word after the first; an agent scores its best matching phrase.

use serde::Serialize;

use crate::agents::shared::{contains_tokens, tokenize};
use crate::agents::AgentType;

const WORD_BONUS: u32 = 3;

const ACCOMMODATION: &[&str] = &[
    "khách sạn", "nhà nghỉ", "homestay", "resort", "hostel", "villa", "chỗ ở", "nơi ở", "lưu trú",
    "đặt phòng", "thuê phòng", "phòng đôi", "phòng đơn", "hotel", "hotels", "budget hotel", "accommodation",
    "lodging", "check in", "5 sao", "4 sao",
];

const FOOD: &[&str] = &[
    "món ăn", "đồ ăn", "ăn gì", "món gì", "ăn uống", "ăn tối", "ăn trưa", "ăn sáng", "đặc sản",
    "ẩm thực", "nhà hàng", "quán ăn", "quán cà phê", "phở", "bún", "bánh mì", "cơm tấm", "hải sản",
    "cà phê", "food", "eat", "restaurant", "restaurants", "cuisine", "dish", "dishes", "cafe",
    "street food",
];

const TRANSPORT: &[&str] = &[
    "di chuyển", "máy bay", "vé máy bay", "chuyến bay", "tàu hỏa", "tàu", "xe khách", "xe buýt",
    "taxi", "grab", "thuê xe", "xe máy", "xe ôm", "sân bay", "bến xe", "ga tàu", "flight",
    "flights", "train", "bus", "transport", "transportation", "airport", "motorbike",
];

const ITINERARY: &[&str] = &[
    "lịch trình", "lập lịch", "kế hoạch", "tham quan", "điểm tham quan", "đi đâu", "chơi gì",
    "hoạt động", "itinerary", "schedule", "plan", "attractions", "sightseeing", "things to do",
    "day trip",
];

const BUDGET: &[&str] = &[
    "ngân sách", "chi phí", "tiết kiệm", "chi tiêu", "bao nhiêu tiền", "tốn bao nhiêu",
    "giá cả", "budget", "cost", "costs", "expense", "expenses", "spending", "money",
];

const GENERAL: &[&str] = &[
    "xin chào", "cảm ơn", "hello", "thanks", "thank you", "thời tiết", "weather", "visa",
];

fn vocabulary(agent: AgentType) -> &'static [&'static str] {
    match agent {
        AgentType::Accommodation => ACCOMMODATION,
        AgentType::Food => FOOD,
        AgentType::Transport => TRANSPORT,
        AgentType::Itinerary => ITINERARY,
        AgentType::Budget => BUDGET,
        AgentType::General => GENERAL,
        AgentType::Error => &[],
    }
}

/// Weight of a phrase given as folded tokens
pub fn phrase_weight(tokens: &[String]) -> u32 {
    if tokens.is_empty() {
        return 0;
    }
    let chars: usize = tokens.iter().map(|t| t.chars().count()).sum();
    chars as u32 + WORD_BONUS * (tokens.len() as u32 - 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingMethod {
    Keyword,
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub agent: AgentType,
    pub confidence: f32,
    pub method: RoutingMethod,
    pub rationale: String,
}

impl RoutingDecision {
    pub fn keyword(agent: AgentType, score: u32) -> Self {
        Self {
            agent,
            confidence: 0.5 + (score.min(20) as f32) / 40.0,
            method: RoutingMethod::Keyword,
            rationale: format!("keyword score {}", score),
        }
    }

    pub fn model(agent: AgentType, rationale: impl Into<String>) -> Self {
        Self {
            agent,
            confidence: 0.7,
            method: RoutingMethod::Model,
            rationale: rationale.into(),
        }
    }

    pub fn fallback(rationale: impl Into<String>) -> Self {
        Self {
            agent: AgentType::General,
            confidence: 0.3,
            method: RoutingMethod::Fallback,
            rationale: rationale.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeywordOutcome {
    Match(AgentType, u32),
    /// Several agents share the top score
    Ambiguous(Vec<AgentType>),
    NoSignal,
}

struct Phrase {
    tokens: Vec<String>,
    weight: u32,
}

pub struct KeywordClassifier {
    vocabularies: Vec<(AgentType, Vec<Phrase>)>,
    threshold: u32,
}

impl KeywordClassifier {
    pub fn new(threshold: u32) -> Self {
        let vocabularies = AgentType::ROUTABLE
            .into_iter()
            .map(|agent| {
                let phrases = vocabulary(agent)
                    .iter()
                    .map(|phrase| {
                        let tokens = tokenize(phrase);
                        let weight = phrase_weight(&tokens);
                        Phrase { tokens, weight }
                    })
                    .collect();
                (agent, phrases)
            })
            .collect();

        Self {
            vocabularies,
            threshold,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Best phrase weight per agent, zero-score agents omitted
    pub fn scores(&self, message: &str) -> Vec<(AgentType, u32)> {
        let tokens = tokenize(message);
        self.vocabularies
            .iter()
            .filter_map(|(agent, phrases)| {
                phrases
                    .iter()
                    .filter(|p| contains_tokens(&tokens, &p.tokens))
                    .map(|p| p.weight)
                    .max()
                    .map(|score| (*agent, score))
            })
            .collect()
    }

    pub fn classify(&self, message: &str) -> KeywordOutcome {
        let scores: Vec<(AgentType, u32)> = self
            .scores(message)
            .into_iter()
            .filter(|(_, score)| *score >= self.threshold)
            .collect();

        let Some(best) = scores.iter().map(|(_, score)| *score).max() else {
            return KeywordOutcome::NoSignal;
        };

        let top: Vec<AgentType> = scores
            .iter()
            .filter(|(_, score)| *score == best)
            .map(|(agent, _)| *agent)
            .collect();

        match top.as_slice() {
            [agent] => KeywordOutcome::Match(*agent, best),
            _ => KeywordOutcome::Ambiguous(top),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(3)
    }
}
