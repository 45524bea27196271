//! Text helpers shared by the agents and the intent router.
//!
//! Matching works on folded tokens: lowercase, Vietnamese diacritics removed,
//! split on anything that is not alphanumeric. "Đà Nẵng", "da nang" and
//! "DA NANG" all become `["da", "nang"]`.

use regex::Regex;
use std::sync::LazyLock;

use crate::models::{Message, Role, TripContext};
use crate::types::LLMMessage;

pub const STYLE_GUIDE: &str = "Trả lời bằng tiếng Việt tự nhiên, thân thiện và ngắn gọn. \
Giữ nguyên tên địa danh tiếng Việt có dấu. \
Ghi số tiền theo đơn vị VND với dấu chấm phân cách hàng nghìn (ví dụ 1.500.000 VND). \
Không bịa đặt giá hoặc địa chỉ không có trong dữ liệu được cung cấp.";

/// Strip Vietnamese diacritics from a lowercase character
fn fold_char(c: char) -> char {
    match c {
        'à' | 'á' | 'ả' | 'ã' | 'ạ' | 'ă' | 'ằ' | 'ắ' | 'ẳ' | 'ẵ' | 'ặ' | 'â' | 'ầ' | 'ấ' | 'ẩ'
        | 'ẫ' | 'ậ' => 'a',
        'đ' => 'd',
        'è' | 'é' | 'ẻ' | 'ẽ' | 'ẹ' | 'ê' | 'ề' | 'ế' | 'ể' | 'ễ' | 'ệ' => 'e',
        'ì' | 'í' | 'ỉ' | 'ĩ' | 'ị' => 'i',
        'ò' | 'ó' | 'ỏ' | 'õ' | 'ọ' | 'ô' | 'ồ' | 'ố' | 'ổ' | 'ỗ' | 'ộ' | 'ơ' | 'ờ' | 'ớ' | 'ở'
        | 'ỡ' | 'ợ' => 'o',
        'ù' | 'ú' | 'ủ' | 'ũ' | 'ụ' | 'ư' | 'ừ' | 'ứ' | 'ử' | 'ữ' | 'ự' => 'u',
        'ỳ' | 'ý' | 'ỷ' | 'ỹ' | 'ỵ' => 'y',
        other => other,
    }
}

pub fn fold(text: &str) -> String {
    text.to_lowercase().chars().map(fold_char).collect()
}

pub fn tokenize(text: &str) -> Vec<String> {
    fold(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

/// Whole-token sequence match of an already tokenized phrase
pub fn contains_tokens(haystack: &[String], phrase: &[String]) -> bool {
    position_of(haystack, phrase).is_some()
}

fn position_of(haystack: &[String], phrase: &[String]) -> Option<usize> {
    if phrase.is_empty() || phrase.len() > haystack.len() {
        return None;
    }
    haystack.windows(phrase.len()).position(|window| window == phrase)
}

pub fn contains_phrase(haystack: &[String], phrase: &str) -> bool {
    contains_tokens(haystack, &tokenize(phrase))
}

pub fn contains_any(haystack: &[String], phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(haystack, p))
}

/// Known destinations: display name followed by spellings people type
const DESTINATIONS: &[(&str, &[&str])] = &[
    ("Hà Nội", &["hà nội", "hanoi"]),
    ("Hồ Chí Minh", &["hồ chí minh", "hcm", "tphcm", "sài gòn", "saigon"]),
    ("Đà Nẵng", &["đà nẵng", "danang"]),
    ("Huế", &["huế"]),
    ("Hội An", &["hội an", "hoian"]),
    ("Nha Trang", &["nha trang", "nhatrang"]),
    ("Đà Lạt", &["đà lạt", "dalat"]),
    ("Phú Quốc", &["phú quốc", "phuquoc"]),
    ("Hạ Long", &["hạ long", "halong"]),
    ("Sa Pa", &["sa pa", "sapa"]),
    ("Cần Thơ", &["cần thơ", "cantho"]),
    ("Ninh Bình", &["ninh bình"]),
];

static TRAVELERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+)\s*(?:người|ng|khách|travell?ers?|people|persons?|pax|adults?)\b")
        .expect("travelers regex is valid")
});

static MONEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3}(?:[.,]\d{3})+|\d+(?:[.,]\d+)?)\s*(triệu|tr|nghìn|ngàn|k|vnd|đồng|đ)\b")
        .expect("money regex is valid")
});

static DAYS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:ngày|days?)\b").expect("days regex is valid"));

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:\d{1,2}/\d{1,2}/\d{4}|\d{4}-\d{2}-\d{2}|\d{1,2}\s+(?:tháng|thg)\s*\d{1,2})\b")
        .expect("date regex is valid")
});

/// Facts pulled out of a free-text message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entities {
    pub locations: Vec<String>,
    pub travelers: Option<u32>,
    /// VND
    pub amounts: Vec<f64>,
    pub dates: Vec<String>,
    /// Trip length such as "3 ngày" or "4 days"
    pub days: Option<u32>,
}

fn parse_amount(number: &str, unit: &str) -> Option<f64> {
    let grouped = number.len() > 4
        && number
            .split(['.', ','])
            .skip(1)
            .all(|group| group.len() == 3);

    let value: f64 = if grouped {
        number.replace(['.', ','], "").parse().ok()?
    } else {
        number.replace(',', ".").parse().ok()?
    };

    let multiplier = match unit.to_lowercase().as_str() {
        "triệu" | "tr" => 1_000_000.0,
        "nghìn" | "ngàn" | "k" => 1_000.0,
        _ => 1.0,
    };

    Some(value * multiplier)
}

pub fn extract_entities(text: &str) -> Entities {
    let tokens = tokenize(text);

    // Ordered by first mention
    let mut mentioned: Vec<(usize, &str)> = DESTINATIONS
        .iter()
        .filter_map(|(name, spellings)| {
            spellings
                .iter()
                .filter_map(|s| position_of(&tokens, &tokenize(s)))
                .min()
                .map(|at| (at, *name))
        })
        .collect();
    mentioned.sort_by_key(|(at, _)| *at);
    let locations = mentioned.into_iter().map(|(_, name)| name.to_string()).collect();

    let travelers = TRAVELERS_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| *n > 0);

    let amounts = MONEY_RE
        .captures_iter(text)
        .filter_map(|c| parse_amount(c.get(1)?.as_str(), c.get(2)?.as_str()))
        .collect();

    let dates = DATE_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    let days = DAYS_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|n| *n > 0);

    Entities {
        locations,
        travelers,
        amounts,
        dates,
        days,
    }
}

/// Where to search: a destination named in the message wins over the trip's
pub fn location_hint(message: &str, trip: Option<&TripContext>) -> Option<String> {
    extract_entities(message)
        .locations
        .into_iter()
        .next()
        .or_else(|| {
            trip.map(|t| t.destination.trim().to_string())
                .filter(|d| !d.is_empty())
        })
}

pub fn history_messages(history: &[Message]) -> Vec<LLMMessage> {
    history
        .iter()
        .map(|m| match m.role {
            Role::User => LLMMessage::user(m.content.as_str()),
            Role::Assistant => LLMMessage::assistant(m.content.as_str()),
            Role::System => LLMMessage::system(m.content.as_str()),
        })
        .collect()
}

/// Compact description of a trip for prompts
pub fn trip_summary(trip: &TripContext) -> String {
    let mut lines = vec![format!("Điểm đến: {}", trip.destination)];

    if let (Some(start), Some(end)) = (trip.start_date, trip.end_date) {
        lines.push(format!(
            "Thời gian: {} đến {}",
            start.format("%d/%m/%Y"),
            end.format("%d/%m/%Y")
        ));
    }
    lines.push(format!("Số người: {}", trip.travelers_count));
    if trip.budget > 0.0 {
        lines.push(format!("Ngân sách: {}", format_money(trip.budget, &trip.currency)));
    }
    if !trip.accommodations.is_empty() {
        let names: Vec<&str> = trip.accommodations.iter().map(|a| a.name.as_str()).collect();
        lines.push(format!("Chỗ ở đã chọn: {}", names.join(", ")));
    }
    if !trip.restaurants.is_empty() {
        let names: Vec<&str> = trip.restaurants.iter().map(|r| r.name.as_str()).collect();
        lines.push(format!("Nhà hàng đã chọn: {}", names.join(", ")));
    }
    if !trip.activities.is_empty() {
        lines.push(format!("Số hoạt động đã lên lịch: {}", trip.activities.len()));
    }

    lines.join("\n")
}

/// Group thousands with dots: 1500000 -> "1.500.000"
fn group_thousands(amount: f64) -> String {
    let rounded = amount.abs().round() as u64;
    let digits = rounded.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    if amount < 0.0 && rounded > 0 {
        format!("-{}", out)
    } else {
        out
    }
}

pub fn format_vnd(amount: f64) -> String {
    format!("{} VND", group_thousands(amount))
}

pub fn format_money(amount: f64, currency: &str) -> String {
    let currency = currency.trim();
    if currency.is_empty() || currency.eq_ignore_ascii_case("vnd") {
        format_vnd(amount)
    } else {
        format!("{} {}", group_thousands(amount), currency.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_tokenize_folds_diacritics() {
        assert_eq!(tokenize("Đà Nẵng!"), vec!["da", "nang"]);
        assert_eq!(tokenize("KHÁCH SẠN, giá rẻ"), vec!["khach", "san", "gia", "re"]);
    }

    #[test]
    fn test_phrase_matching_is_whole_token() {
        let tokens = tokenize("tôi muốn đặt phòng khách sạn");
        assert!(contains_phrase(&tokens, "khách sạn"));
        assert!(contains_phrase(&tokens, "khach san"));
        assert!(!contains_phrase(&tokens, "sạn khách"));
        // "hotel" must not match inside "hotels"
        assert!(!contains_phrase(&tokenize("hotels near me"), "hotel"));
    }

    #[test]
    fn test_extract_locations() {
        let entities = extract_entities("Đi từ Sài Gòn ra Hà Nội rồi về da nang");
        assert_eq!(entities.locations, vec!["Hồ Chí Minh", "Hà Nội", "Đà Nẵng"]);
    }

    #[test]
    fn test_extract_travelers_and_amounts() {
        let entities = extract_entities("Nhóm 4 người, ngân sách 2 triệu mỗi ngày, ăn tối 500k");
        assert_eq!(entities.travelers, Some(4));
        assert_eq!(entities.amounts, vec![2_000_000.0, 500_000.0]);

        let entities = extract_entities("3 travelers with 1.500.000 VND and 1,5 tr extra");
        assert_eq!(entities.travelers, Some(3));
        assert_eq!(entities.amounts, vec![1_500_000.0, 1_500_000.0]);
    }

    #[test]
    fn test_extract_dates() {
        let entities = extract_entities("Đi ngày 12/03/2025 hoặc 2025-03-14, về 20 tháng 3");
        assert_eq!(entities.dates.len(), 3);
        assert_eq!(entities.days, None);

        assert_eq!(extract_entities("lịch trình 3 ngày 2 đêm").days, Some(3));
    }

    #[test]
    fn test_location_hint_prefers_message() {
        let trip = TripContext::new(1, "Huế");
        assert_eq!(location_hint("khách sạn ở Hội An", Some(&trip)).as_deref(), Some("Hội An"));
        assert_eq!(location_hint("khách sạn gần biển", Some(&trip)).as_deref(), Some("Huế"));
        assert_eq!(location_hint("khách sạn gần biển", None), None);
    }

    #[test]
    fn test_format_vnd() {
        assert_eq!(format_vnd(1_500_000.0), "1.500.000 VND");
        assert_eq!(format_vnd(950.0), "950 VND");
        assert_eq!(format_vnd(-250_000.0), "-250.000 VND");
        assert_eq!(format_money(1200.0, "usd"), "1.200 USD");
    }

    #[test]
    fn test_history_messages_keep_roles() {
        let message = Message {
            id: 1,
            conversation_id: 1,
            role: Role::Assistant,
            content: "Xin chào".to_string(),
            agent_type: Some("general".to_string()),
            metadata: None,
            created_at: Utc::now(),
        };
        let converted = history_messages(&[message]);
        assert_eq!(converted[0].role, "assistant");
    }
}
