// src/demo.rs

//! Built-in order-validation rule forest used by the `rulekit` binary.
//!
//! Shows ordered rules, a proactive and a reactive link, a nested rule
//! resolved by token, an exception handler, exchange traffic and (on the
//! concurrent executor) a pair of parallel rules.

use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;

use crate::engine::RuleRegistry;
use crate::rule::{
    AsyncRule, Rule, RuleContext, RuleDefinition, RuleInstance, RuleResult, RuleToken, model,
};

const SUBTOTAL_KEY: &str = "subtotal_cents";
const KNOWN_COUPONS: &[&str] = &["WELCOME10", "SPRING"];
const FREE_SHIPPING_CENTS: u64 = 50_00;

#[derive(Debug, Clone)]
pub struct OrderLine {
    pub sku: String,
    pub quantity: u32,
    pub unit_cents: u64,
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: u32,
    pub lines: Vec<OrderLine>,
    pub coupon: Option<String>,
    pub country: String,
}

impl Order {
    fn subtotal_cents(&self) -> u64 {
        self.lines
            .iter()
            .map(|line| u64::from(line.quantity) * line.unit_cents)
            .sum()
    }

    fn units(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

pub fn sample_order() -> Order {
    Order {
        id: 1042,
        lines: vec![
            OrderLine {
                sku: "KB-01".into(),
                quantity: 2,
                unit_cents: 89_00,
            },
            OrderLine {
                sku: "CBL-USB".into(),
                quantity: 10,
                unit_cents: 4_50,
            },
        ],
        coupon: Some("SUMMER".into()),
        country: "NO".into(),
    }
}

fn cents(value: u64) -> String {
    format!("{}.{:02}", value / 100, value % 100)
}

/// Resolver for the rules the forest references by token.
pub fn registry() -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    registry.register::<BulkDiscount>();
    registry
}

/// The forest for one order. Parallel rules need the concurrent executor
/// and are only included when `concurrent` is set.
pub fn forest(order: &Order, concurrent: bool) -> Vec<RuleDefinition> {
    let mut rules = vec![
        RuleDefinition::new(RuleInstance::new(ApplyCoupon), model(order.clone())),
        RuleDefinition::new(RuleInstance::new(ComputeSubtotal), model(order.clone())),
        RuleDefinition::new(RuleInstance::new(ValidateLines), model(order.clone())),
        RuleDefinition::new(RuleInstance::new(CheckInventory), model(order.clone())),
        RuleDefinition::new(RuleInstance::new(ComputeTax), model(order.clone())),
        RuleDefinition::new(RuleInstance::new(CouponRejected), model(order.clone())),
    ];
    if concurrent {
        rules.push(RuleDefinition::new(RuleInstance::new_async(ShippingQuote), model(order.clone())));
        rules.push(RuleDefinition::new(RuleInstance::new_async(FraudScreen), model(order.clone())));
    }
    rules
}

pub struct ValidateLines;

impl Rule for ValidateLines {
    fn declare(&self, rule: &RuleContext) {
        rule.configure(|c| c.execution_order = Some(1));
    }

    fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        let order = rule.model::<Order>()?;
        if order.lines.is_empty() {
            bail!("order {} has no lines", order.id);
        }

        let result = RuleResult::with_output(format!("{} lines", order.lines.len()));
        match order.lines.iter().find(|line| line.quantity == 0) {
            Some(line) => Ok(Some(result.with_error(format!("line {} has zero quantity", line.sku)))),
            None => Ok(Some(result)),
        }
    }
}

pub struct CheckInventory;

impl Rule for CheckInventory {
    fn declare(&self, rule: &RuleContext) {
        rule.set_proactive(true);
        rule.observe::<ComputeSubtotal>();
    }

    fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        let order = rule.model::<Order>()?;
        Ok(Some(RuleResult::with_output(format!("{} units reserved", order.units()))))
    }
}

pub struct ComputeSubtotal;

impl Rule for ComputeSubtotal {
    fn declare(&self, rule: &RuleContext) {
        rule.configure(|c| c.execution_order = Some(2));
    }

    /// Setup runs on every execute; the discount is queued on the first.
    fn initialize(&mut self, rule: &RuleContext) -> anyhow::Result<()> {
        if !rule.is_nested() {
            let order = rule.model::<Order>()?;
            rule.add_rule(
                RuleDefinition::token(RuleToken::of::<BulkDiscount>(), model((*order).clone()))
                    .only_if_parent(),
            );
        }
        Ok(())
    }

    fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        let subtotal = rule.model::<Order>()?.subtotal_cents();
        rule.try_add(SUBTOTAL_KEY, subtotal)?;
        Ok(Some(RuleResult::with_output(format!("subtotal {}", cents(subtotal)))))
    }
}

#[derive(Default)]
pub struct BulkDiscount;

impl Rule for BulkDiscount {
    fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        let order = rule.model::<Order>()?;
        if order.units() < 10 {
            return Ok(None);
        }
        let discount = order.subtotal_cents() / 20;
        Ok(Some(RuleResult::with_output(format!("bulk discount {}", cents(discount)))))
    }
}

pub struct ComputeTax;

impl Rule for ComputeTax {
    fn declare(&self, rule: &RuleContext) {
        rule.set_reactive(true);
        rule.observe::<ComputeSubtotal>();
    }

    fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        let order = rule.model::<Order>()?;
        let subtotal = rule.try_get_value(SUBTOTAL_KEY)?;
        let Some(subtotal) = subtotal.downcast_ref::<u64>() else {
            bail!("'{SUBTOTAL_KEY}' is not an amount");
        };
        let rate_percent = match order.country.as_str() {
            "NO" => 25,
            "DE" => 19,
            _ => 0,
        };
        let tax = subtotal * rate_percent / 100;
        Ok(Some(RuleResult::with_output(format!("tax {} ({rate_percent}%)", cents(tax)))))
    }
}

pub struct ApplyCoupon;

impl Rule for ApplyCoupon {
    fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        let order = rule.model::<Order>()?;
        let Some(code) = order.coupon.as_deref() else {
            return Ok(None);
        };
        if !KNOWN_COUPONS.contains(&code) {
            bail!("unknown coupon '{code}'");
        }
        Ok(Some(RuleResult::with_output(format!("coupon {code} applied"))))
    }
}

pub struct CouponRejected;

impl Rule for CouponRejected {
    fn declare(&self, rule: &RuleContext) {
        rule.set_exception_handler(true);
        rule.observe::<ApplyCoupon>();
    }

    fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        let reason = rule
            .unhandled_error()
            .map(|error| error.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Some(
            RuleResult::with_output("coupon ignored".to_string()).with_error(reason),
        ))
    }
}

pub struct ShippingQuote;

#[async_trait]
impl AsyncRule for ShippingQuote {
    fn declare(&self, rule: &RuleContext) {
        rule.set_parallel(true);
    }

    async fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        let subtotal = rule
            .try_get_value_async_with_timeout(SUBTOTAL_KEY, Duration::from_secs(2))
            .await?;
        let subtotal = subtotal.downcast_ref::<u64>().copied().unwrap_or_default();
        let quote = if subtotal >= FREE_SHIPPING_CENTS { 0 } else { 9_90 };
        Ok(Some(RuleResult::with_output(format!("shipping {}", cents(quote)))))
    }
}

pub struct FraudScreen;

#[async_trait]
impl AsyncRule for FraudScreen {
    fn declare(&self, rule: &RuleContext) {
        rule.set_parallel(true);
    }

    async fn invoke(&mut self, rule: &RuleContext) -> anyhow::Result<Option<RuleResult>> {
        let order = rule.model::<Order>()?;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let verdict = if order.subtotal_cents() > 1_000_00 { "review" } else { "clear" };
        Ok(Some(RuleResult::with_output(format!("fraud screen: {verdict}"))))
    }
}
