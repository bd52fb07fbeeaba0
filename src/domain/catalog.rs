use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Static credit-package catalog. Prices are stored in minor units for USD and
/// whole won for KRW; the catalog is configuration, not persisted state.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CreditPackage {
    pub id: &'static str,
    pub name_ko: &'static str,
    pub name_en: &'static str,
    pub description_ko: &'static str,
    pub description_en: &'static str,
    pub credits: i32,
    pub price_krw: i64,
    pub price_usd_cents: i64,
    pub popular: bool,
    pub savings_ko: Option<&'static str>,
    pub savings_en: Option<&'static str>,
}

pub const CREDIT_PACKAGES: [CreditPackage; 3] = [
    CreditPackage {
        id: "trial",
        name_ko: "체험팩",
        name_en: "Trial Pack",
        description_ko: "가볍게 체험해보세요",
        description_en: "Try it out",
        credits: 3,
        price_krw: 2900,
        price_usd_cents: 249,
        popular: false,
        savings_ko: None,
        savings_en: None,
    },
    CreditPackage {
        id: "starter",
        name_ko: "스타터팩",
        name_en: "Starter Pack",
        description_ko: "다양한 직업 체험",
        description_en: "Explore various careers",
        credits: 10,
        price_krw: 7900,
        price_usd_cents: 599,
        popular: true,
        savings_ko: Some("19% 할인"),
        savings_en: Some("19% off"),
    },
    CreditPackage {
        id: "family",
        name_ko: "패밀리팩",
        name_en: "Family Pack",
        description_ko: "온 가족이 함께",
        description_en: "For the whole family",
        credits: 30,
        price_krw: 19900,
        price_usd_cents: 1499,
        popular: false,
        savings_ko: Some("33% 할인"),
        savings_en: Some("33% off"),
    },
];

impl CreditPackage {
    pub fn find(id: &str) -> Option<&'static CreditPackage> {
        CREDIT_PACKAGES.iter().find(|p| p.id == id)
    }
}

/// Recurring premium plans, checked out through the same payment provider as
/// credit packages but reconciled via subscription lifecycle webhooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PremiumPlan {
    Monthly,
    Yearly,
}

impl PremiumPlan {
    pub fn id(&self) -> &'static str {
        match self {
            PremiumPlan::Monthly => "premium_monthly",
            PremiumPlan::Yearly => "premium_yearly",
        }
    }
}

impl fmt::Display for PremiumPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for PremiumPlan {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "premium_monthly" | "monthly" => Ok(PremiumPlan::Monthly),
            "premium_yearly" | "yearly" => Ok(PremiumPlan::Yearly),
            _ => Err(()),
        }
    }
}

/// Free-tier allowance: one generation per UTC day, restricted to the default
/// theme/format/shot combination.
pub const FREE_DAILY_LIMIT: i32 = 1;
