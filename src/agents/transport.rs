//! Transport Agent
//!
//! Answers inter-city and local transport questions from a reference table of
//! Vietnamese carriers and price ranges, plus transit hubs found near the
//! destination. The hub search and the model call run concurrently.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::shared::{self, STYLE_GUIDE};
use super::{Agent, AgentAction, AgentData, AgentDeps, AgentError, AgentRequest, AgentResponse, AgentType};
use crate::llm::GenerationOptions;
use crate::places::{Place, PlaceCategory, PlaceFilters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportIntent {
    InterCity,
    Local,
    General,
}

const INTER_CITY_WORDS: &[&str] = &[
    "máy bay", "chuyến bay", "vé máy bay", "flight", "fly", "tàu", "tàu hỏa", "train",
    "xe khách", "liên tỉnh", "bus",
];
const LOCAL_WORDS: &[&str] = &[
    "grab", "taxi", "xe máy", "thuê xe", "nội thành", "di chuyển trong", "xe ôm", "motorbike",
    "scooter",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportOption {
    pub mode: String,
    pub label: String,
    pub providers: Vec<String>,
    pub price_range: String,
    #[serde(default)]
    pub booking_sites: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportData {
    pub options: Vec<TransportOption>,
    pub hubs: Vec<Place>,
}

struct Reference {
    mode: &'static str,
    label: &'static str,
    providers: &'static [&'static str],
    price_range: &'static str,
    booking_sites: &'static [&'static str],
}

const INTER_CITY: &[Reference] = &[
    Reference {
        mode: "flight",
        label: "Máy bay",
        providers: &["Vietnam Airlines", "Vietjet Air", "Bamboo Airways"],
        price_range: "800.000 - 3.000.000 VND",
        booking_sites: &["vietnamairlines.com", "vietjetair.com", "bambooairways.com"],
    },
    Reference {
        mode: "train",
        label: "Tàu hỏa",
        providers: &["Đường sắt Việt Nam"],
        price_range: "300.000 - 1.500.000 VND",
        booking_sites: &["dsvn.vn", "vetau.com.vn"],
    },
    Reference {
        mode: "bus",
        label: "Xe khách",
        providers: &["Phương Trang (Futa)", "Hoàng Long", "Mai Linh", "Thành Bưởi"],
        price_range: "150.000 - 500.000 VND",
        booking_sites: &["futabus.vn", "vexere.com"],
    },
];

const LOCAL: &[Reference] = &[
    Reference {
        mode: "grab",
        label: "Grab",
        providers: &["Grab", "Be", "Xanh SM"],
        price_range: "15.000 - 50.000 VND/km",
        booking_sites: &[],
    },
    Reference {
        mode: "taxi",
        label: "Taxi",
        providers: &["Mai Linh", "Vinasun"],
        price_range: "15.000 - 20.000 VND/km",
        booking_sites: &[],
    },
    Reference {
        mode: "motorbike_rental",
        label: "Thuê xe máy",
        providers: &["Cửa hàng cho thuê địa phương"],
        price_range: "100.000 - 200.000 VND/ngày",
        booking_sites: &[],
    },
    Reference {
        mode: "xe_om",
        label: "Xe ôm",
        providers: &["Xe ôm truyền thống"],
        price_range: "10.000 - 30.000 VND/km",
        booking_sites: &[],
    },
];

impl From<&Reference> for TransportOption {
    fn from(reference: &Reference) -> Self {
        Self {
            mode: reference.mode.to_string(),
            label: reference.label.to_string(),
            providers: reference.providers.iter().map(|p| p.to_string()).collect(),
            price_range: reference.price_range.to_string(),
            booking_sites: reference.booking_sites.iter().map(|s| s.to_string()).collect(),
        }
    }
}

pub fn detect_intent(message: &str) -> TransportIntent {
    let tokens = shared::tokenize(message);
    let local = shared::contains_any(&tokens, LOCAL_WORDS);
    let inter_city = shared::contains_any(&tokens, INTER_CITY_WORDS)
        || shared::extract_entities(message).locations.len() >= 2;

    match (inter_city, local) {
        (true, false) => TransportIntent::InterCity,
        (false, true) => TransportIntent::Local,
        _ => TransportIntent::General,
    }
}

pub fn reference_options(intent: TransportIntent) -> Vec<TransportOption> {
    let tables: &[&[Reference]] = match intent {
        TransportIntent::InterCity => &[INTER_CITY],
        TransportIntent::Local => &[LOCAL],
        TransportIntent::General => &[INTER_CITY, LOCAL],
    };
    tables
        .iter()
        .flat_map(|table| table.iter().map(TransportOption::from))
        .collect()
}

fn describe_options(options: &[TransportOption]) -> String {
    options
        .iter()
        .map(|o| {
            let mut line = format!("- {}: {} ({})", o.label, o.providers.join(", "), o.price_range);
            if !o.booking_sites.is_empty() {
                line.push_str(&format!(", đặt vé: {}", o.booking_sites.join(", ")));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub struct TransportAgent {
    deps: AgentDeps,
}

impl TransportAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn find_hubs(&self, location: Option<&str>) -> Vec<Place> {
        let Some(location) = location else {
            return Vec::new();
        };
        let filters = PlaceFilters {
            limit: Some(self.deps.max_candidates),
            ..Default::default()
        };
        self.deps
            .places
            .search_places(PlaceCategory::Transit, location, &filters)
            .await
    }
}

#[async_trait]
impl Agent for TransportAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Transport
    }

    async fn respond(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let intent = detect_intent(&request.message);
        let mentioned = shared::extract_entities(&request.message).locations;

        // Hubs are searched where the traveler is heading
        let destination = mentioned
            .last()
            .cloned()
            .or_else(|| shared::location_hint(&request.message, request.trip.as_ref()));
        let origin = (mentioned.len() >= 2).then(|| mentioned[0].clone());

        let options = reference_options(intent);
        let prompt = format!(
            "Người dùng hỏi: \"{}\"\nĐiểm xuất phát: {}\nĐiểm đến: {}\n\n\
             Phương án tham khảo:\n{}\n\n\
             Tư vấn phương tiện phù hợp nhất, so sánh thời gian và chi phí.",
            request.message,
            origin.as_deref().unwrap_or("chưa rõ"),
            destination.as_deref().unwrap_or("chưa rõ"),
            describe_options(&options)
        );
        let system = GenerationOptions::with_system(format!(
            "Bạn là chuyên gia tư vấn di chuyển tại Việt Nam. {}",
            STYLE_GUIDE
        ));
        let context = shared::history_messages(&request.history);

        let (hubs, generated) = tokio::join!(
            self.find_hubs(destination.as_deref()),
            self.deps.generator.generate(&prompt, &context, &system),
        );

        info!(?intent, destination = ?destination, hubs = hubs.len(), "Transport lookup done");

        let message = match generated {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Transport reply generation failed, using reference table");
                let mut text = format!("Các phương án di chuyển tham khảo:\n{}", describe_options(&options));
                if !hubs.is_empty() {
                    let names: Vec<&str> = hubs.iter().map(|h| h.name.as_str()).collect();
                    text.push_str(&format!("\n\nĐầu mối giao thông gần bạn: {}", names.join(", ")));
                }
                text
            }
        };

        let mut actions = Vec::new();
        if let (TransportIntent::InterCity, Some(from), Some(to)) = (intent, origin.as_deref(), destination.as_deref()) {
            for option in &options {
                actions.push(
                    AgentAction::new("add_transportation", format!("{} {} - {}", option.label, from, to))
                        .with_payload(json!({
                            "type": option.mode,
                            "from_location": from,
                            "to_location": to,
                            "price_range": option.price_range,
                        })),
                );
            }
        }

        let suggestions: &[&str] = match intent {
            TransportIntent::InterCity => &["So sánh giá vé", "Đặt vé máy bay", "Xem lịch tàu"],
            TransportIntent::Local => &["Thuê xe máy", "Gọi Grab", "Phương tiện công cộng"],
            TransportIntent::General => AgentType::Transport.default_suggestions(),
        };

        Ok(AgentResponse::new(AgentType::Transport, message)
            .with_data(AgentData::Transport(TransportData { options, hubs }))
            .with_actions(actions)
            .with_suggestions(suggestions.iter().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{deps, deps_with_places, place, OfflineGenerator};
    use std::sync::Arc;

    #[test]
    fn test_detect_intent() {
        assert_eq!(detect_intent("Vé máy bay đi Phú Quốc"), TransportIntent::InterCity);
        assert_eq!(detect_intent("Hà Nội đến Sapa"), TransportIntent::InterCity);
        assert_eq!(detect_intent("gọi grab ở Đà Lạt"), TransportIntent::Local);
        assert_eq!(detect_intent("đi lại thế nào"), TransportIntent::General);
    }

    #[test]
    fn test_reference_options() {
        assert_eq!(reference_options(TransportIntent::InterCity).len(), 3);
        assert_eq!(reference_options(TransportIntent::Local).len(), 4);
        assert_eq!(reference_options(TransportIntent::General).len(), 7);
    }

    #[tokio::test]
    async fn test_inter_city_route_actions() {
        let agent = TransportAgent::new(deps(Arc::new(OfflineGenerator)));
        let response = agent
            .respond(&AgentRequest::new("Đi tàu từ Huế ra Hà Nội"))
            .await
            .unwrap();

        assert!(response.message.contains("Tàu hỏa"));
        assert_eq!(response.actions.len(), 3);
        let payload = response.actions[0].payload.as_ref().unwrap();
        assert_eq!(payload["from_location"], "Huế");
        assert_eq!(payload["to_location"], "Hà Nội");
    }

    #[tokio::test]
    async fn test_local_lists_hubs() {
        let agent = TransportAgent::new(deps_with_places(
            Arc::new(OfflineGenerator),
            vec![place("Bến xe Đà Nẵng", None, None)],
        ));
        let response = agent
            .respond(&AgentRequest::new("taxi ở Đà Nẵng"))
            .await
            .unwrap();

        match response.data {
            Some(AgentData::Transport(data)) => {
                assert_eq!(data.hubs.len(), 1);
                assert!(data.options.iter().all(|o| o.booking_sites.is_empty()));
            }
            other => panic!("unexpected data: {:?}", other),
        }
        assert!(response.message.contains("Bến xe Đà Nẵng"));
        assert!(response.actions.is_empty());
    }
}
