//! The shipment order form and the placeholders it fills.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Days, NaiveDate};
use docx_fill_core::ReplacementSet;
use serde::{Deserialize, Deserializer, Serialize};

/// Dates as they are printed in the template body.
const COMMA_DATE: &str = "%d,%m,%Y";
/// Dates as they are printed in the CAPAC sheet and generic tokens.
const SLASH_DATE: &str = "%d/%m/%Y";

/// Accepts `dd/MM/yyyy`, `dd.MM.yyyy`, `dd,MM,yyyy` or ISO `yyyy-MM-dd`.
pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    ["%d/%m/%Y", "%d.%m.%Y", COMMA_DATE, "%Y-%m-%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .ok_or_else(|| format!("invalid date '{s}', expected dd/MM/yyyy or yyyy-MM-dd"))
}

fn deserialize_date<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(s) if !s.trim().is_empty() => {
            parse_date(&s).map(Some).map_err(serde::de::Error::custom)
        }
        _ => Ok(None),
    }
}

/// Everything the order form collects. Text fields are trimmed when used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ShipmentOrder {
    pub tank_number: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub pickup_date: Option<NaiveDate>,
    #[serde(deserialize_with = "deserialize_date")]
    pub delivery_date: Option<NaiveDate>,
    pub loading_address: String,
    pub unloading_address: String,
    pub description: String,
    pub max_payment_days: String,

    // CAPAC sheet
    pub client: String,
    pub route: String,
    #[serde(deserialize_with = "deserialize_date")]
    pub capac_date: Option<NaiveDate>,
    pub registration_number: String,
    pub carrier: String,
    pub price: String,
    pub currency: String,
    pub quantity: String,
    pub client_invoice: String,
    pub carrier_invoice: String,
}

impl ShipmentOrder {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read order file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse order file {}", path.display()))
    }

    /// `"{price} {currency}"`, empty when both are empty.
    pub fn price_text(&self) -> String {
        format!("{} {}", self.price.trim(), self.currency.trim())
            .trim()
            .to_string()
    }

    pub fn max_days_text(&self) -> String {
        match self.max_payment_days.trim() {
            "" => String::new(),
            days => format!("maxim {days} zile"),
        }
    }

    fn quantity_text(&self) -> String {
        match self.quantity.trim() {
            "" => String::new(),
            qty => format!("{qty} KG"),
        }
    }

    /// Placeholder table for the shipment order template, in application order.
    ///
    /// Missing dates fall back to `today` (pickup, CAPAC date) and the day
    /// after (delivery).
    pub fn replacements(&self, today: NaiveDate) -> ReplacementSet {
        let pickup = self.pickup_date.unwrap_or(today);
        let delivery = self
            .delivery_date
            .unwrap_or_else(|| today.checked_add_days(Days::new(1)).unwrap_or(today));
        let capac_date = self.capac_date.unwrap_or(today);
        let price = self.price_text();
        let max_days = self.max_days_text();
        let t = |s: &str| s.trim().to_string();

        ReplacementSet::new()
            .with("nr. Tank", t(&self.tank_number))
            .with("21,11,2023", pickup.format(COMMA_DATE).to_string())
            .with("24,11,2023", delivery.format(COMMA_DATE).to_string())
            .with("Adresa de incarcare", t(&self.loading_address))
            .with("Adresa de descarcare", t(&self.unloading_address))
            .with("Descriere marfa:", t(&self.description))
            .with("PREŢ NEGOCIAT:", format!("PREŢ NEGOCIAT: {price}"))
            .with("maxim 45 zile", max_days.clone())
            .with("CLIENT:", format!("CLIENT: {}", t(&self.client)))
            .with("RUTA:", format!("RUTA: {}", t(&self.route)))
            .with("DATA:", format!("DATA: {}", capac_date.format(SLASH_DATE)))
            .with(
                "NUMAR INMATRICULARE:",
                format!("NUMAR INMATRICULARE: {}", t(&self.registration_number)),
            )
            .with("TRANSPORTATOR:", format!("TRANSPORTATOR: {}", t(&self.carrier)))
            .with("PRET:", format!("PRET: {price}"))
            .with(
                "Cantitate incarcata:",
                format!("Cantitate incarcata: {}", self.quantity_text()),
            )
            .with("Factura client:", format!("Factura client: {}", t(&self.client_invoice)))
            .with("Factura caraus:", format!("Factura caraus: {}", t(&self.carrier_invoice)))
            .with("{{DatePickup}}", pickup.format(SLASH_DATE).to_string())
            .with("{{DateDeliver}}", delivery.format(SLASH_DATE).to_string())
            .with("{{Today}}", today.format(SLASH_DATE).to_string())
            .with("{{NrTank}}", t(&self.tank_number))
            .with("{{Description}}", t(&self.description))
            .with("{{Address1}}", t(&self.loading_address))
            .with("{{Address2}}", t(&self.unloading_address))
            .with("{{Price}}", price)
            .with("{{MaxDays}}", max_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn test_keys_keep_template_order() {
        let set = ShipmentOrder::default().replacements(today());
        let keys: Vec<&str> = set.keys().collect();
        assert_eq!(keys.len(), 26);
        assert_eq!(&keys[..3], &["nr. Tank", "21,11,2023", "24,11,2023"]);
        assert_eq!(keys.last(), Some(&"{{MaxDays}}"));
        let pos = |k: &str| keys.iter().position(|x| *x == k).unwrap();
        assert!(pos("PREŢ NEGOCIAT:") < pos("PRET:"));
    }

    #[test]
    fn test_dates_default_to_today_and_tomorrow() {
        let set = ShipmentOrder::default().replacements(today());
        assert_eq!(set.get("21,11,2023"), Some("04,03,2024"));
        assert_eq!(set.get("24,11,2023"), Some("05,03,2024"));
        assert_eq!(set.get("DATA:"), Some("DATA: 04/03/2024"));
        assert_eq!(set.get("{{DateDeliver}}"), Some("05/03/2024"));
        assert_eq!(set.get("{{Today}}"), Some("04/03/2024"));
    }

    #[test]
    fn test_price_quantity_and_days() {
        let order = ShipmentOrder {
            price: " 1200 ".into(),
            currency: "EUR".into(),
            quantity: "24000".into(),
            max_payment_days: "30".into(),
            ..ShipmentOrder::default()
        };
        let set = order.replacements(today());
        assert_eq!(set.get("PRET:"), Some("PRET: 1200 EUR"));
        assert_eq!(set.get("{{Price}}"), Some("1200 EUR"));
        assert_eq!(set.get("Cantitate incarcata:"), Some("Cantitate incarcata: 24000 KG"));
        assert_eq!(set.get("maxim 45 zile"), Some("maxim 30 zile"));
    }

    #[test]
    fn test_empty_optional_fields() {
        let set = ShipmentOrder::default().replacements(today());
        assert_eq!(set.get("PREŢ NEGOCIAT:"), Some("PREŢ NEGOCIAT: "));
        assert_eq!(set.get("{{Price}}"), Some(""));
        assert_eq!(set.get("maxim 45 zile"), Some(""));
        assert_eq!(set.get("Cantitate incarcata:"), Some("Cantitate incarcata: "));
    }

    #[test]
    fn test_currency_without_price() {
        let order = ShipmentOrder {
            currency: "RON".into(),
            ..ShipmentOrder::default()
        };
        assert_eq!(order.price_text(), "RON");
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 11, 21).unwrap();
        for input in ["21/11/2023", "21.11.2023", "21,11,2023", "2023-11-21", " 21/11/2023 "] {
            assert_eq!(parse_date(input), Ok(expected), "{input}");
        }
        assert!(parse_date("11/21/2023").is_err());
    }

    #[test]
    fn test_order_from_json() {
        let order: ShipmentOrder = serde_json::from_str(
            r#"{"tank_number": "B-42", "pickup_date": "21/11/2023", "delivery_date": "", "client": "ACME"}"#,
        )
        .unwrap();
        assert_eq!(order.tank_number, "B-42");
        assert_eq!(order.pickup_date, NaiveDate::from_ymd_opt(2023, 11, 21));
        assert_eq!(order.delivery_date, None);
        assert_eq!(order.client, "ACME");
    }
}
