//! Food Agent
//!
//! Three kinds of questions land here: where to eat (restaurant search), what
//! to eat (regional specialties) and everything else about food.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use super::shared::{self, STYLE_GUIDE};
use super::{Agent, AgentAction, AgentData, AgentDeps, AgentError, AgentRequest, AgentResponse, AgentType};
use crate::llm::GenerationOptions;
use crate::places::{Place, PlaceCategory, PlaceFilters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodIntent {
    Restaurant,
    Dish,
    General,
}

const RESTAURANT_WORDS: &[&str] = &[
    "nhà hàng", "quán ăn", "quán", "ăn ở đâu", "chỗ ăn", "đi ăn", "restaurant", "restaurants",
    "đặt bàn", "where to eat",
];
const DISH_WORDS: &[&str] = &[
    "món gì", "ăn gì", "đặc sản", "nên thử", "món ngon", "phải ăn", "must try", "specialty",
    "specialties", "local food", "dish", "dishes",
];

/// Phrase in the message, search keyword sent to the places provider
const CUISINES: &[(&str, &str)] = &[
    ("phở", "phở"),
    ("pho", "phở"),
    ("bún", "bún"),
    ("bánh mì", "bánh mì"),
    ("cơm", "cơm"),
    ("hải sản", "hải sản"),
    ("seafood", "hải sản"),
    ("chay", "chay"),
    ("vegetarian", "chay"),
    ("vegan", "chay"),
    ("nướng", "nướng"),
    ("bbq", "nướng"),
    ("lẩu", "lẩu"),
    ("hotpot", "lẩu"),
];

pub fn detect_intent(message: &str) -> FoodIntent {
    let tokens = shared::tokenize(message);
    if shared::contains_any(&tokens, RESTAURANT_WORDS) {
        FoodIntent::Restaurant
    } else if shared::contains_any(&tokens, DISH_WORDS) {
        FoodIntent::Dish
    } else {
        FoodIntent::General
    }
}

pub fn cuisine_keyword(message: &str) -> Option<&'static str> {
    let tokens = shared::tokenize(message);
    CUISINES
        .iter()
        .find(|(phrase, _)| shared::contains_phrase(&tokens, phrase))
        .map(|(_, keyword)| *keyword)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    North,
    Central,
    South,
}

pub struct Dish {
    pub name: &'static str,
    pub description: &'static str,
}

pub struct RegionalCuisine {
    pub region: Region,
    pub label: &'static str,
    pub cities: &'static [&'static str],
    pub specialties: &'static [Dish],
    pub street_food: &'static [&'static str],
}

pub const REGIONAL_CUISINE: &[RegionalCuisine] = &[
    RegionalCuisine {
        region: Region::North,
        label: "miền Bắc",
        cities: &["Hà Nội", "Hạ Long", "Sa Pa", "Ninh Bình"],
        specialties: &[
            Dish { name: "Phở Hà Nội", description: "nước dùng xương bò trong, bánh phở mềm, thơm quế hồi" },
            Dish { name: "Bún chả", description: "chả nướng than hoa ăn cùng bún và nước mắm chua ngọt" },
            Dish { name: "Bánh cuốn", description: "bánh tráng hấp mỏng cuộn nhân thịt và mộc nhĩ" },
            Dish { name: "Chả cá Lã Vọng", description: "cá lăng nướng nghệ, đảo thì là trên chảo nóng" },
            Dish { name: "Bún bò Nam Bộ", description: "bún trộn thịt bò xào, rau thơm và lạc rang" },
            Dish { name: "Bánh tôm Hồ Tây", description: "bánh khoai chiên giòn với tôm đồng" },
        ],
        street_food: &["Bánh mì", "Xôi", "Bánh rán", "Kem Tràng Tiền"],
    },
    RegionalCuisine {
        region: Region::Central,
        label: "miền Trung",
        cities: &["Huế", "Đà Nẵng", "Hội An", "Nha Trang"],
        specialties: &[
            Dish { name: "Bún bò Huế", description: "nước dùng cay nồng mùi sả, giò heo và chả cua" },
            Dish { name: "Cơm hến", description: "cơm nguội trộn hến, tóp mỡ và rau sống" },
            Dish { name: "Bánh bèo", description: "bánh gạo nhỏ trong chén, rắc tôm chấy" },
            Dish { name: "Mì Quảng", description: "sợi mì vàng, ít nước, ăn với bánh tráng nướng" },
            Dish { name: "Cao lầu Hội An", description: "sợi mì dai đặc trưng, thịt xá xíu và rau Trà Quế" },
            Dish { name: "Bánh mì Đà Nẵng", description: "ổ bánh nhỏ, nhân pa tê và chả" },
        ],
        street_food: &["Bánh tráng cuốn thịt heo", "Bê thui", "Chè Huế"],
    },
    RegionalCuisine {
        region: Region::South,
        label: "miền Nam",
        cities: &["Hồ Chí Minh", "Cần Thơ", "Phú Quốc", "Đà Lạt"],
        specialties: &[
            Dish { name: "Hủ tiếu Nam Vang", description: "sợi hủ tiếu với tôm, thịt bằm, gan và nước dùng ngọt" },
            Dish { name: "Cơm tấm", description: "cơm gạo tấm với sườn nướng, bì và chả trứng" },
            Dish { name: "Bánh mì Sài Gòn", description: "ổ bánh giòn nhiều nhân, đồ chua và rau thơm" },
            Dish { name: "Bún mắm", description: "nước lèo mắm cá linh, hải sản và heo quay" },
            Dish { name: "Lẩu mắm", description: "lẩu miền Tây ăn cùng nhiều loại rau đồng" },
            Dish { name: "Bánh canh cua", description: "sợi bánh canh dai trong nước dùng cua sánh" },
        ],
        street_food: &["Gỏi cuốn", "Bánh tráng trộn", "Chè miền Tây", "Trái cây"],
    },
];

pub fn cuisine_for(location: &str) -> Option<&'static RegionalCuisine> {
    let tokens = shared::tokenize(location);
    REGIONAL_CUISINE.iter().find(|cuisine| {
        cuisine
            .cities
            .iter()
            .any(|city| shared::contains_phrase(&tokens, city))
    })
}

fn price_range(level: Option<u8>) -> String {
    match level {
        Some(level) => "$".repeat(level.min(3) as usize + 1),
        None => String::new(),
    }
}

pub struct FoodAgent {
    deps: AgentDeps,
}

impl FoodAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn generate_or(&self, request: &AgentRequest, prompt: &str, fallback: String) -> String {
        let options = GenerationOptions::with_system(format!(
            "Bạn là chuyên gia ẩm thực Việt Nam, am hiểu món ngon từng vùng miền. {}",
            STYLE_GUIDE
        ));
        let context = shared::history_messages(&request.history);

        match self.deps.generator.generate(prompt, &context, &options).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Food reply generation failed, using canned reply");
                fallback
            }
        }
    }

    async fn restaurants(&self, request: &AgentRequest) -> AgentResponse {
        let Some(location) = shared::location_hint(&request.message, request.trip.as_ref()) else {
            return AgentResponse::new(
                AgentType::Food,
                "Bạn muốn tìm quán ăn ở thành phố nào? Tôi sẽ gợi ý những nơi ngon nhất.",
            )
            .with_suggestions(["Nhà hàng ở Hà Nội", "Quán ăn ở Đà Nẵng", "Quán ngon Sài Gòn"]);
        };

        let cuisine = cuisine_keyword(&request.message);
        let filters = PlaceFilters {
            keyword: cuisine.map(String::from),
            limit: Some(self.deps.max_candidates),
            ..Default::default()
        };

        let places = self
            .deps
            .places
            .search_places(PlaceCategory::Restaurant, &location, &filters)
            .await;

        info!(location = %location, cuisine = ?cuisine, candidates = places.len(), "Restaurant search done");

        if places.is_empty() {
            return AgentResponse::new(
                AgentType::Food,
                format!(
                    "Tôi không tìm thấy nhà hàng phù hợp tại {}. Bạn thử tìm món khác hoặc khu vực lân cận nhé.",
                    location
                ),
            )
            .with_data(AgentData::Restaurants(Vec::new()))
            .with_suggestions(["Gợi ý món đặc sản", "Tìm ở khu vực khác", "Quán ăn bình dân"]);
        }

        let listing = places
            .iter()
            .map(|p| {
                format!(
                    "- {} | {} | rating: {} | giá: {}",
                    p.name,
                    p.address,
                    p.rating.map(|r| format!("{:.1}", r)).unwrap_or_else(|| "n/a".to_string()),
                    price_range(p.price_level),
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Người dùng hỏi: \"{}\"\n\nCác nhà hàng tại {}:\n{}\n\n\
             Giới thiệu ngắn gọn những quán này và món nên gọi ở mỗi quán.",
            request.message, location, listing
        );

        let fallback = restaurant_summary(&location, &places);
        let message = self.generate_or(request, &prompt, fallback).await;

        let actions = places
            .iter()
            .map(|place| {
                AgentAction::new("save_restaurant", format!("Lưu {}", place.name)).with_payload(json!({
                    "name": place.name,
                    "address": place.address,
                    "rating": place.rating,
                    "price_range": price_range(place.price_level),
                    "cuisine_type": cuisine.unwrap_or("Việt Nam"),
                    "place_id": place.place_id,
                }))
            })
            .collect();

        AgentResponse::new(AgentType::Food, message)
            .with_data(AgentData::Restaurants(places))
            .with_actions(actions)
            .with_suggestions(["Xem thêm nhà hàng", "Gợi ý món đặc sản", "Đặt bàn"])
    }

    async fn dishes(&self, request: &AgentRequest) -> AgentResponse {
        let location = shared::location_hint(&request.message, request.trip.as_ref());
        let cuisine = location.as_deref().and_then(cuisine_for);

        debug!(location = ?location, region = ?cuisine.map(|c| c.region), "Recommending dishes");

        let knowledge = match cuisine {
            Some(cuisine) => dish_listing(cuisine),
            None => REGIONAL_CUISINE.iter().map(dish_listing).collect::<Vec<_>>().join("\n\n"),
        };

        let prompt = format!(
            "Người dùng hỏi: \"{}\"\nĐiểm đến: {}\n\nMón đặc sản tham khảo:\n{}\n\n\
             Gợi ý những món nên thử và giải thích ngắn gọn vì sao chúng đặc biệt.",
            request.message,
            location.as_deref().unwrap_or("chưa rõ"),
            knowledge
        );

        let message = self.generate_or(request, &prompt, knowledge).await;

        AgentResponse::new(AgentType::Food, message).with_suggestions([
            "Tìm nhà hàng có món này",
            "Món ăn đường phố",
            "Quán ăn bình dân",
        ])
    }

    async fn general(&self, request: &AgentRequest) -> AgentResponse {
        let trip = request
            .trip
            .as_ref()
            .map(shared::trip_summary)
            .unwrap_or_default();
        let prompt = format!(
            "Người dùng hỏi về ẩm thực: \"{}\"\n\nThông tin chuyến đi:\n{}",
            request.message, trip
        );
        let message = self
            .generate_or(request, &prompt, AgentType::Food.canned_reply().to_string())
            .await;
        AgentResponse::new(AgentType::Food, message)
    }
}

fn dish_listing(cuisine: &RegionalCuisine) -> String {
    let mut lines = vec![format!("Đặc sản {}:", cuisine.label)];
    for dish in cuisine.specialties {
        lines.push(format!("- {}: {}", dish.name, dish.description));
    }
    lines.push(format!("Ăn vặt đường phố: {}", cuisine.street_food.join(", ")));
    lines.join("\n")
}

fn restaurant_summary(location: &str, places: &[Place]) -> String {
    let mut lines = vec![format!("Một số quán ăn đáng thử tại {}:", location)];
    for (i, place) in places.iter().enumerate() {
        let rating = place
            .rating
            .map(|r| format!(" ({:.1}★)", r))
            .unwrap_or_default();
        lines.push(format!("{}. {}{} - {}", i + 1, place.name, rating, place.address));
    }
    lines.join("\n")
}

#[async_trait]
impl Agent for FoodAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Food
    }

    async fn respond(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let intent = detect_intent(&request.message);
        info!(?intent, "Food agent handling request");

        Ok(match intent {
            FoodIntent::Restaurant => self.restaurants(request).await,
            FoodIntent::Dish => self.dishes(request).await,
            FoodIntent::General => self.general(request).await,
        })
    }
}
