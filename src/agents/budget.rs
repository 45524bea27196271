//! Budget Agent
//!
//! All figures are computed here. The model is only asked for saving tips,
//! and canned tips stand in when it is unavailable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::shared::{self, format_money};
use super::{Agent, AgentData, AgentDeps, AgentError, AgentRequest, AgentResponse, AgentType};
use crate::llm::GenerationOptions;
use crate::models::TripContext;

pub const DEFAULT_BUDGET: f64 = 5_000_000.0;
const DEFAULT_DAYS: i64 = 3;

/// Suggested split of a trip budget, in percent
pub const ALLOCATION: &[(&str, u8)] = &[
    ("accommodation", 35),
    ("food", 25),
    ("transport", 20),
    ("activities", 15),
    ("miscellaneous", 5),
];

const CANNED_TIPS: &[&str] = &[
    "Đặt phòng sớm để được giá tốt",
    "Ăn ở quán địa phương thay vì nhà hàng du lịch",
    "Đi xe khách hoặc đi chung Grab để giảm chi phí di chuyển",
    "Mua vé combo cho các điểm tham quan",
    "Tránh đi vào mùa cao điểm và dịp lễ",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetIntent {
    Estimate,
    Optimize,
    Breakdown,
    General,
}

const ESTIMATE_WORDS: &[&str] = &["ước tính", "bao nhiêu", "chi phí", "tốn", "cost", "how much", "estimate"];
const OPTIMIZE_WORDS: &[&str] = &["tiết kiệm", "giảm", "tối ưu", "rẻ hơn", "save", "saving", "optimize"];
const BREAKDOWN_WORDS: &[&str] = &["phân bổ", "chia", "breakdown", "chi tiết", "hạng mục", "allocate", "allocation"];

pub fn detect_intent(message: &str) -> BudgetIntent {
    let tokens = shared::tokenize(message);
    if shared::contains_any(&tokens, OPTIMIZE_WORDS) {
        BudgetIntent::Optimize
    } else if shared::contains_any(&tokens, BREAKDOWN_WORDS) {
        BudgetIntent::Breakdown
    } else if shared::contains_any(&tokens, ESTIMATE_WORDS) {
        BudgetIntent::Estimate
    } else {
        BudgetIntent::General
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendingTier {
    Budget,
    Moderate,
    Luxury,
}

impl SpendingTier {
    pub fn from_message(message: &str) -> Self {
        let tokens = shared::tokenize(message);
        if shared::contains_any(&tokens, &["cao cấp", "sang trọng", "luxury", "5 sao"]) {
            SpendingTier::Luxury
        } else if shared::contains_any(&tokens, &["tiết kiệm", "giá rẻ", "bình dân", "backpack", "cheap"]) {
            SpendingTier::Budget
        } else {
            SpendingTier::Moderate
        }
    }

    /// Nightly room rate
    fn accommodation_rate(&self) -> f64 {
        match self {
            SpendingTier::Budget => 400_000.0,
            SpendingTier::Moderate => 1_000_000.0,
            SpendingTier::Luxury => 3_000_000.0,
        }
    }

    /// Per person per day
    fn food_rate(&self) -> f64 {
        match self {
            SpendingTier::Budget => 200_000.0,
            SpendingTier::Moderate => 500_000.0,
            SpendingTier::Luxury => 1_000_000.0,
        }
    }
}

const LOCAL_TRANSPORT_PER_DAY: f64 = 150_000.0;
const INTER_CITY_TRANSPORT: f64 = 500_000.0;
const ACTIVITIES_PER_DAY: f64 = 300_000.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationLine {
    pub category: String,
    pub percent: u8,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub days: i64,
    pub travelers: i64,
    pub tier: SpendingTier,
    pub accommodation: f64,
    pub food: f64,
    pub transport: f64,
    pub activities: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetReport {
    pub currency: String,
    pub total_budget: f64,
    /// Planned and actual expenses together
    pub total_expenses: f64,
    pub planned_total: f64,
    pub actual_spent: f64,
    pub remaining: f64,
    pub is_overspent: bool,
    pub by_category: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation: Option<Vec<AllocationLine>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimate: Option<CostEstimate>,
    #[serde(default)]
    pub tips: Vec<String>,
}

impl BudgetReport {
    /// Totals for a trip; without one, the budget comes from the message or
    /// the default.
    pub fn compute(trip: Option<&TripContext>, stated_budget: Option<f64>) -> Self {
        let total_budget = trip
            .map(|t| t.budget)
            .filter(|b| *b > 0.0)
            .or(stated_budget)
            .unwrap_or(DEFAULT_BUDGET);

        let expenses = trip.map(|t| t.expenses.as_slice()).unwrap_or_default();

        let mut by_category = BTreeMap::new();
        let mut planned_total = 0.0;
        let mut actual_spent = 0.0;
        for expense in expenses {
            *by_category.entry(expense.category.clone()).or_insert(0.0) += expense.amount;
            if expense.is_planned {
                planned_total += expense.amount;
            } else {
                actual_spent += expense.amount;
            }
        }

        let total_expenses = planned_total + actual_spent;
        let remaining = total_budget - total_expenses;

        Self {
            currency: trip
                .map(|t| t.currency.clone())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "VND".to_string()),
            total_budget,
            total_expenses,
            planned_total,
            actual_spent,
            remaining,
            is_overspent: remaining < 0.0,
            by_category,
            allocation: None,
            estimate: None,
            tips: Vec::new(),
        }
    }
}

pub fn allocate(total: f64) -> Vec<AllocationLine> {
    ALLOCATION
        .iter()
        .map(|(category, percent)| AllocationLine {
            category: category.to_string(),
            percent: *percent,
            amount: total * f64::from(*percent) / 100.0,
        })
        .collect()
}

pub fn estimate(days: i64, travelers: i64, tier: SpendingTier) -> CostEstimate {
    let days = days.max(1);
    let travelers = travelers.max(1);
    let accommodation = days as f64 * tier.accommodation_rate();
    let food = (days * travelers) as f64 * tier.food_rate();
    let transport = days as f64 * LOCAL_TRANSPORT_PER_DAY + INTER_CITY_TRANSPORT;
    let activities = days as f64 * ACTIVITIES_PER_DAY;

    CostEstimate {
        days,
        travelers,
        tier,
        accommodation,
        food,
        transport,
        activities,
        total: accommodation + food + transport + activities,
    }
}

fn category_label(category: &str) -> &str {
    match category {
        "accommodation" => "Lưu trú",
        "food" => "Ăn uống",
        "transport" | "transportation" => "Di chuyển",
        "activities" | "activity" => "Tham quan, vui chơi",
        "miscellaneous" | "other" => "Chi phí khác",
        other => other,
    }
}

fn render(report: &BudgetReport) -> String {
    let money = |amount: f64| format_money(amount, &report.currency);
    let mut lines = vec![
        format!("Tổng ngân sách: {}", money(report.total_budget)),
        format!(
            "Đã lên kế hoạch và chi tiêu: {} (thực chi {})",
            money(report.total_expenses),
            money(report.actual_spent)
        ),
        format!("Còn lại: {}", money(report.remaining)),
    ];

    if report.is_overspent {
        lines.push(format!(
            "Bạn đang vượt ngân sách {}.",
            money(-report.remaining)
        ));
    }

    if !report.by_category.is_empty() {
        lines.push(String::new());
        lines.push("Theo hạng mục:".to_string());
        for (category, amount) in &report.by_category {
            lines.push(format!("- {}: {}", category_label(category), money(*amount)));
        }
    }

    if let Some(allocation) = &report.allocation {
        lines.push(String::new());
        lines.push("Phân bổ đề xuất:".to_string());
        for line in allocation {
            lines.push(format!(
                "- {} ({}%): {}",
                category_label(&line.category),
                line.percent,
                money(line.amount)
            ));
        }
    }

    if let Some(estimate) = &report.estimate {
        lines.push(String::new());
        lines.push(format!(
            "Ước tính cho {} ngày, {} người:",
            estimate.days, estimate.travelers
        ));
        lines.push(format!("- Lưu trú: {}", money(estimate.accommodation)));
        lines.push(format!("- Ăn uống: {}", money(estimate.food)));
        lines.push(format!("- Di chuyển: {}", money(estimate.transport)));
        lines.push(format!("- Tham quan: {}", money(estimate.activities)));
        lines.push(format!("Tổng cộng: {}", money(estimate.total)));
    }

    if !report.tips.is_empty() {
        lines.push(String::new());
        lines.push("Mẹo tiết kiệm:".to_string());
        for tip in &report.tips {
            lines.push(format!("- {}", tip));
        }
    }

    lines.join("\n")
}

/// One tip per non-empty line, list markers stripped
fn parse_tips(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '-' | '*' | '•' | '.' | ')'))
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .take(5)
        .collect()
}

pub struct BudgetAgent {
    deps: AgentDeps,
}

impl BudgetAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn saving_tips(&self, request: &AgentRequest, report: &BudgetReport) -> Vec<String> {
        let prompt = format!(
            "Chuyến đi: {}\nTổng ngân sách: {}\nĐã chi và dự kiến: {}\n\
             Câu hỏi: \"{}\"\n\n\
             Đưa ra tối đa 5 mẹo tiết kiệm cụ thể, mỗi mẹo một dòng, không giải thích thêm.",
            request
                .trip
                .as_ref()
                .map(|t| t.destination.as_str())
                .unwrap_or("Việt Nam"),
            format_money(report.total_budget, &report.currency),
            format_money(report.total_expenses, &report.currency),
            request.message
        );
        let options = GenerationOptions::with_system(
            "Bạn là chuyên gia du lịch tiết kiệm tại Việt Nam. Trả lời bằng tiếng Việt.",
        )
        .temperature(0.5);

        match self.deps.generator.generate(&prompt, &[], &options).await {
            Ok(text) => {
                let tips = parse_tips(&text);
                if tips.is_empty() {
                    CANNED_TIPS.iter().map(|t| t.to_string()).collect()
                } else {
                    tips
                }
            }
            Err(e) => {
                warn!(error = %e, "Saving tips generation failed, using canned tips");
                CANNED_TIPS.iter().map(|t| t.to_string()).collect()
            }
        }
    }
}

#[async_trait]
impl Agent for BudgetAgent {
    fn agent_type(&self) -> AgentType {
        AgentType::Budget
    }

    async fn respond(&self, request: &AgentRequest) -> Result<AgentResponse, AgentError> {
        let intent = detect_intent(&request.message);
        let entities = shared::extract_entities(&request.message);
        let trip = request.trip.as_ref();

        let mut report = BudgetReport::compute(trip, entities.amounts.first().copied());

        match intent {
            BudgetIntent::Estimate => {
                let days = trip
                    .and_then(|t| t.duration_days())
                    .or(entities.days.map(i64::from))
                    .unwrap_or(DEFAULT_DAYS);
                let travelers = trip
                    .map(|t| i64::from(t.travelers_count))
                    .filter(|n| *n > 0)
                    .or(entities.travelers.map(i64::from))
                    .unwrap_or(1);
                report.estimate = Some(estimate(
                    days,
                    travelers,
                    SpendingTier::from_message(&request.message),
                ));
            }
            BudgetIntent::Breakdown => {
                report.allocation = Some(allocate(report.total_budget));
            }
            BudgetIntent::Optimize | BudgetIntent::General => {}
        }

        if intent == BudgetIntent::Optimize || report.is_overspent {
            report.tips = self.saving_tips(request, &report).await;
        }

        info!(
            ?intent,
            total_budget = report.total_budget,
            remaining = report.remaining,
            overspent = report.is_overspent,
            "Budget report computed"
        );

        Ok(AgentResponse::new(AgentType::Budget, render(&report))
            .with_data(AgentData::Budget(report))
            .with_suggestions(AgentType::Budget.default_suggestions().iter().copied()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{deps, FixedGenerator, OfflineGenerator};
    use crate::models::TripExpense;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn expense(category: &str, amount: f64, is_planned: bool) -> TripExpense {
        TripExpense {
            id: 1,
            category: category.to_string(),
            description: String::new(),
            amount,
            currency: "VND".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            is_planned,
        }
    }

    fn trip(budget: f64, expenses: Vec<TripExpense>) -> TripContext {
        let mut trip = TripContext::new(1, "Nha Trang");
        trip.budget = budget;
        trip.expenses = expenses;
        trip
    }

    #[test]
    fn test_remaining_counts_planned_and_actual() {
        let trip = trip(1000.0, vec![expense("food", 300.0, false), expense("transport", 200.0, true)]);
        let report = BudgetReport::compute(Some(&trip), None);
        assert_eq!(report.remaining, 500.0);
        assert_eq!(report.actual_spent, 300.0);
        assert_eq!(report.planned_total, 200.0);
        assert!(!report.is_overspent);
        assert_eq!(report.by_category.get("food"), Some(&300.0));
    }

    #[test]
    fn test_overspend_flagged() {
        let trip = trip(1000.0, vec![expense("food", 800.0, false), expense("food", 400.0, false)]);
        let report = BudgetReport::compute(Some(&trip), None);
        assert_eq!(report.remaining, -200.0);
        assert!(report.is_overspent);
        assert_eq!(report.by_category.get("food"), Some(&1200.0));
    }

    #[test]
    fn test_budget_fallbacks() {
        assert_eq!(BudgetReport::compute(None, None).total_budget, DEFAULT_BUDGET);
        assert_eq!(BudgetReport::compute(None, Some(8_000_000.0)).total_budget, 8_000_000.0);
    }

    #[test]
    fn test_allocation_sums_to_total() {
        let lines = allocate(10_000_000.0);
        assert_eq!(lines[0].amount, 3_500_000.0);
        let sum: f64 = lines.iter().map(|l| l.amount).sum();
        assert!((sum - 10_000_000.0).abs() < 1e-6);
    }

    #[test]
    fn test_estimate_rates() {
        let e = estimate(3, 2, SpendingTier::Moderate);
        assert_eq!(e.accommodation, 3_000_000.0);
        assert_eq!(e.food, 3_000_000.0);
        assert_eq!(e.transport, 950_000.0);
        assert_eq!(e.activities, 900_000.0);
        assert_eq!(e.total, 7_850_000.0);
    }

    #[test]
    fn test_detect_intent() {
        assert_eq!(detect_intent("Làm sao để tiết kiệm chi phí?"), BudgetIntent::Optimize);
        assert_eq!(detect_intent("phân bổ ngân sách giúp tôi"), BudgetIntent::Breakdown);
        assert_eq!(detect_intent("đi Huế 3 ngày tốn bao nhiêu"), BudgetIntent::Estimate);
        assert_eq!(detect_intent("ngân sách của tôi"), BudgetIntent::General);
    }

    #[test]
    fn test_parse_tips() {
        let tips = parse_tips("1. Đặt vé sớm\n\n- Ăn quán địa phương\n• Đi xe buýt");
        assert_eq!(tips, vec!["Đặt vé sớm", "Ăn quán địa phương", "Đi xe buýt"]);
    }

    #[tokio::test]
    async fn test_overspent_trip_gets_canned_tips() {
        let agent = BudgetAgent::new(deps(Arc::new(OfflineGenerator)));
        let request = AgentRequest::new("ngân sách của tôi thế nào")
            .with_trip(trip(1000.0, vec![expense("food", 1500.0, false)]));
        let response = agent.respond(&request).await.unwrap();

        match response.data {
            Some(AgentData::Budget(report)) => {
                assert!(report.is_overspent);
                assert_eq!(report.tips.len(), CANNED_TIPS.len());
            }
            other => panic!("unexpected data: {:?}", other),
        }
        assert!(response.message.contains("vượt ngân sách"));
    }

    #[tokio::test]
    async fn test_estimate_uses_message_entities() {
        let generator = Arc::new(FixedGenerator::new("unused"));
        let agent = BudgetAgent::new(deps(generator.clone()));
        let response = agent
            .respond(&AgentRequest::new("2 người đi 4 ngày tốn bao nhiêu?"))
            .await
            .unwrap();

        let Some(AgentData::Budget(report)) = response.data else {
            panic!("budget data expected");
        };
        let estimate = report.estimate.unwrap();
        assert_eq!(estimate.days, 4);
        assert_eq!(estimate.travelers, 2);
        assert!(generator.prompts().is_empty());
    }
}
