//! Delivery zones (the 58 wilayas) and their default fees.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::value_objects::{DeliveryMethod, Money, ZoneCode};

pub const WILAYAS: [(&str, &str); 58] = [
    ("01", "Adrar"), ("02", "Chlef"), ("03", "Laghouat"), ("04", "Oum El Bouaghi"), ("05", "Batna"),
    ("06", "Béjaïa"), ("07", "Biskra"), ("08", "Béchar"), ("09", "Blida"), ("10", "Bouira"),
    ("11", "Tamanrasset"), ("12", "Tébessa"), ("13", "Tlemcen"), ("14", "Tiaret"), ("15", "Tizi Ouzou"),
    ("16", "Alger"), ("17", "Djelfa"), ("18", "Jijel"), ("19", "Sétif"), ("20", "Saïda"),
    ("21", "Skikda"), ("22", "Sidi Bel Abbès"), ("23", "Annaba"), ("24", "Guelma"), ("25", "Constantine"),
    ("26", "Médéa"), ("27", "Mostaganem"), ("28", "M'Sila"), ("29", "Mascara"), ("30", "Ouargla"),
    ("31", "Oran"), ("32", "El Bayadh"), ("33", "Illizi"), ("34", "Bordj Bou Arréridj"), ("35", "Boumerdès"),
    ("36", "El Tarf"), ("37", "Tindouf"), ("38", "Tissemsilt"), ("39", "El Oued"), ("40", "Khenchela"),
    ("41", "Souk Ahras"), ("42", "Tipaza"), ("43", "Mila"), ("44", "Aïn Defla"), ("45", "Naâma"),
    ("46", "Aïn Témouchent"), ("47", "Ghardaïa"), ("48", "Relizane"), ("49", "El M'Ghair"), ("50", "El Meniaa"),
    ("51", "Ouled Djellal"), ("52", "Bordj Badji Mokhtar"), ("53", "Béni Abbès"), ("54", "Timimoun"), ("55", "Touggourt"),
    ("56", "Djanet"), ("57", "In Salah"), ("58", "In Guezzam"),
];

/// Display name of a wilaya; unknown codes are passed through as-is.
pub fn zone_name(code: &ZoneCode) -> String {
    WILAYAS
        .iter()
        .find(|(c, _)| *c == code.as_str())
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.as_str().to_string())
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneFees {
    #[serde(alias = "domicile")]
    pub home: Money,
    #[serde(alias = "yalidine")]
    pub carrier_office: Money,
}

impl ZoneFees {
    fn new(home: i64, carrier_office: i64) -> Self { Self { home: Money::dzd(home), carrier_office: Money::dzd(carrier_office) } }
    pub fn for_method(&self, method: DeliveryMethod) -> Money {
        match method { DeliveryMethod::Home => self.home, DeliveryMethod::CarrierOffice => self.carrier_office }
    }
}

/// Fee table keyed by zone code.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryPrices(HashMap<String, ZoneFees>);

impl DeliveryPrices {
    /// Shipping from Alger: zone 0, the surrounding ring, the north, the south and the far south.
    pub fn defaults() -> Self {
        let mut table = HashMap::new();
        let tiers: [(&[&str], ZoneFees); 5] = [
            (&["16"], ZoneFees::new(490, 350)),
            (&["09", "35", "42"], ZoneFees::new(600, 450)),
            (&["32", "33", "45", "49", "50", "51", "53", "54", "55", "01", "08", "37"], ZoneFees::new(950, 750)),
            (&["11", "52", "56", "57", "58"], ZoneFees::new(1500, 1300)),
            (&[], ZoneFees::new(800, 550)),
        ];
        for (code, _) in WILAYAS {
            let fees = tiers
                .iter()
                .find(|(codes, _)| codes.contains(&code))
                .map(|(_, fees)| *fees)
                .unwrap_or(tiers[4].1);
            table.insert(code.to_string(), fees);
        }
        Self(table)
    }

    /// Admin-saved fees take precedence; zones they omit keep the default.
    pub fn merged_over_defaults(self) -> Self {
        let mut merged = Self::defaults();
        merged.0.extend(self.0);
        merged
    }

    pub fn fee(&self, zone: &ZoneCode, method: DeliveryMethod) -> Money {
        self.0.get(zone.as_str()).map(|f| f.for_method(method)).unwrap_or(Money::ZERO)
    }
}
