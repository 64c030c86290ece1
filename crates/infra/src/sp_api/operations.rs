//! Typed SP-API operations

use std::fmt;
use std::str::FromStr;

use sellerscan_domain::constants::{
    FAMILY_CATALOG, FAMILY_COMPETITIVE_PRICING, FAMILY_OFFERS, MAX_COMPETITIVE_PRICING_ASINS,
};
use sellerscan_domain::SellerScanError;

use super::client::{ApiRequest, ApiResponse, SpApiClient};
use super::errors::{RequestFailure, SpApiError};

/// Offer condition filter for the pricing API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemCondition {
    #[default]
    New,
    Used,
    Collectible,
    Refurbished,
    Club,
}

impl ItemCondition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Used => "Used",
            Self::Collectible => "Collectible",
            Self::Refurbished => "Refurbished",
            Self::Club => "Club",
        }
    }
}

impl fmt::Display for ItemCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemCondition {
    type Err = SellerScanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "used" => Ok(Self::Used),
            "collectible" => Ok(Self::Collectible),
            "refurbished" => Ok(Self::Refurbished),
            "club" => Ok(Self::Club),
            other => Err(SellerScanError::InvalidInput(format!("unknown item condition '{other}'"))),
        }
    }
}

/// Per-identifier lookup a scan can run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ItemOperation {
    #[default]
    CatalogItem,
    ItemOffers { condition: ItemCondition },
    CompetitivePricing,
}

impl ItemOperation {
    /// Request for a single ASIN in `marketplace_id`.
    pub fn request(&self, asin: &str, marketplace_id: &str) -> ApiRequest {
        match self {
            Self::CatalogItem => catalog_item_request(asin, marketplace_id),
            Self::ItemOffers { condition } => item_offers_request(asin, *condition, marketplace_id),
            Self::CompetitivePricing => competitive_pricing_request(&[asin], marketplace_id),
        }
    }

    pub fn family(&self) -> &'static str {
        match self {
            Self::CatalogItem => FAMILY_CATALOG,
            Self::ItemOffers { .. } => FAMILY_OFFERS,
            Self::CompetitivePricing => FAMILY_COMPETITIVE_PRICING,
        }
    }
}

impl FromStr for ItemOperation {
    type Err = SellerScanError;

    /// `catalog`, `offers`, `offers:<condition>` or `competitive_pricing`.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (name, condition) = match value.split_once(':') {
            Some((name, condition)) => (name, Some(condition)),
            None => (value, None),
        };
        match (name.trim(), condition) {
            ("catalog", None) => Ok(Self::CatalogItem),
            ("offers", None) => Ok(Self::ItemOffers { condition: ItemCondition::New }),
            ("offers", Some(condition)) => Ok(Self::ItemOffers { condition: condition.parse()? }),
            ("competitive_pricing", None) => Ok(Self::CompetitivePricing),
            _ => Err(SellerScanError::InvalidInput(format!("unknown operation '{value}'"))),
        }
    }
}

fn catalog_item_request(asin: &str, marketplace_id: &str) -> ApiRequest {
    ApiRequest::get(
        format!("/catalog/2022-04-01/items/{}", urlencoding::encode(asin)),
        FAMILY_CATALOG,
    )
    .query("marketplaceIds", marketplace_id)
    .query("includedData", "summaries,salesRanks")
}

fn item_offers_request(asin: &str, condition: ItemCondition, marketplace_id: &str) -> ApiRequest {
    ApiRequest::get(
        format!("/products/pricing/v0/items/{}/offers", urlencoding::encode(asin)),
        FAMILY_OFFERS,
    )
    .query("MarketplaceId", marketplace_id)
    .query("ItemCondition", condition.as_str())
}

fn competitive_pricing_request(asins: &[&str], marketplace_id: &str) -> ApiRequest {
    ApiRequest::get("/products/pricing/v0/competitivePrice", FAMILY_COMPETITIVE_PRICING)
        .query("MarketplaceId", marketplace_id)
        .query("Asins", asins.join(","))
        .query("ItemType", "Asin")
}

impl SpApiClient {
    /// Catalog details for one ASIN.
    pub async fn get_catalog_item(&self, asin: &str) -> Result<ApiResponse, RequestFailure> {
        self.request(&catalog_item_request(asin, self.marketplace_id())).await
    }

    /// Current offers for one ASIN in the given condition.
    pub async fn get_item_offers(
        &self,
        asin: &str,
        condition: ItemCondition,
    ) -> Result<ApiResponse, RequestFailure> {
        self.request(&item_offers_request(asin, condition, self.marketplace_id())).await
    }

    /// Competitive pricing for up to 20 ASINs in one call.
    pub async fn get_competitive_pricing(
        &self,
        asins: &[&str],
    ) -> Result<ApiResponse, RequestFailure> {
        if asins.is_empty() || asins.len() > MAX_COMPETITIVE_PRICING_ASINS {
            return Err(RequestFailure::new(
                SpApiError::Config(format!(
                    "competitive pricing takes 1 to {MAX_COMPETITIVE_PRICING_ASINS} ASINs, got {}",
                    asins.len()
                )),
                0,
            ));
        }
        self.request(&competitive_pricing_request(asins, self.marketplace_id())).await
    }
}
