//! # Search URL codec
//!
//! Search result pages on the listing site are addressed by a fixed base URL
//! followed by `#!` and a percent-encoded JSON payload. The payload's
//! `action` member carries the filter expression (see [`predicate`]), the
//! rest controls paging and sorting:
//!
//! ```text
//! {"action":"(And.Hidden.N._.( .. ))","toggle":{},"layer":"","sort":"ModifiedDate",
//!  "page":1,"limit":20,"searchKey":"","loginCheck":false}
//! ```
//!
//! Encoding is strict and reports what it cannot express. Pretty-printing is
//! best effort and never fails, it is only used for logs and the `decode`
//! command.

pub mod predicate;

use std::borrow::Cow;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{QueryError, Result};
pub use predicate::{Field, Predicate};

pub const SEARCH_BASE_URL: &str = "http://www.encar.com/dc/dc_carsearchlist.do?carType=kor";
pub const FRAGMENT_MARKER: &str = "#!";
pub const DEFAULT_SORT: &str = "ModifiedDate";
pub const DETAIL_BASE_URL: &str = "https://fem.encar.com/cars/detail/";

const HIDDEN_FILTER: &str = "N";
const LEGACY_DETAIL_PAGE: &str = "dc_cardetailview.do";
const LEGACY_ID_PARAM: &str = "carid";
const DETAIL_PATH: &str = "/cars/detail/";

/// Characters `encodeURIComponent` leaves alone but `urlencoding` escapes.
const URI_COMPONENT_MARKS: [(&str, &str); 5] = [
    ("%21", "!"),
    ("%27", "'"),
    ("%28", "("),
    ("%29", ")"),
    ("%2A", "*"),
];

/// Order of the nested model filters, outermost first.
const CHAIN_ORDER: [Field; 7] = [
    Field::CarType,
    Field::Manufacturer,
    Field::ModelGroup,
    Field::Model,
    Field::BadgeGroup,
    Field::Badge,
    Field::BadgeDetail,
];

/// Structured search filters for one vehicle model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuerySpec {
    /// `Y` for domestic makes, `N` for imports
    pub country: String,
    pub manufacturer: String,
    pub model_group: String,
    pub model: String,
    pub badge_group: Option<String>,
    pub badge: Option<String>,
    /// At most one entry can be encoded; more would need an `Or` group.
    pub badge_details: Vec<String>,
    /// Equipment options, each required.
    pub options: Vec<String>,
}

impl SearchQuerySpec {
    pub fn to_predicate(&self) -> Result<Predicate> {
        let mut chain: Vec<(Field, &str)> = Vec::with_capacity(CHAIN_ORDER.len());

        for (field, value, name) in [
            (Field::CarType, &self.country, "country"),
            (Field::Manufacturer, &self.manufacturer, "manufacturer"),
            (Field::ModelGroup, &self.model_group, "model group"),
            (Field::Model, &self.model, "model"),
        ] {
            if value.trim().is_empty() {
                return Err(QueryError::MissingField(name));
            }
            chain.push((field, value.as_str()));
        }

        let badge_group = non_empty(self.badge_group.as_deref());
        let badge = non_empty(self.badge.as_deref());

        if let Some(badge_group) = badge_group {
            chain.push((Field::BadgeGroup, badge_group));
        }
        if let Some(badge) = badge {
            if badge_group.is_none() {
                return Err(QueryError::Orphan {
                    field: "badge",
                    parent: "badge group",
                });
            }
            chain.push((Field::Badge, badge));
        }

        match self.badge_details.as_slice() {
            [] => {}
            [detail] => {
                if badge.is_none() {
                    return Err(QueryError::Orphan {
                        field: "badge detail",
                        parent: "badge",
                    });
                }
                chain.push((Field::BadgeDetail, detail.as_str()));
            }
            details => {
                return Err(QueryError::UnsupportedAlternation {
                    field: "badge detail",
                    count: details.len(),
                });
            }
        }

        for &(field, value) in &chain {
            check_encodable(field, value)?;
        }
        for option in &self.options {
            check_encodable(Field::Options, option)?;
        }

        let model_chain = chain
            .into_iter()
            .rev()
            .fold(None, |inner, (field, value)| {
                Some(match inner {
                    None => Predicate::term(field, value),
                    Some(refine) => Predicate::category(field, value, refine),
                })
            });

        let mut terms = vec![Predicate::term(Field::Hidden, HIDDEN_FILTER)];
        terms.extend(
            self.options
                .iter()
                .map(|option| Predicate::term(Field::Options, option.as_str())),
        );
        terms.extend(model_chain);

        Ok(Predicate::And(terms))
    }

    pub fn from_predicate(predicate: &Predicate) -> Result<Self> {
        let Predicate::And(children) = predicate else {
            return Err(QueryError::UnexpectedShape(
                "expression must be an And group".to_string(),
            ));
        };

        let mut spec = Self::default();
        let mut model_chain = None;

        for child in children {
            match child {
                Predicate::Term {
                    field: Field::Hidden,
                    ..
                } => {}
                Predicate::Term {
                    field: Field::Options,
                    value,
                } => spec.options.push(value.clone()),
                other if model_chain.is_none() => model_chain = Some(other),
                other => {
                    return Err(QueryError::UnexpectedShape(format!(
                        "second model filter `{other}`"
                    )));
                }
            }
        }

        let mut node = model_chain
            .ok_or_else(|| QueryError::UnexpectedShape("no model filter".to_string()))?;
        let mut position = 0;

        loop {
            let (field, value, refine) = match node {
                Predicate::Category {
                    field,
                    value,
                    refine,
                } => (*field, value, Some(refine.as_ref())),
                Predicate::Term { field, value } => (*field, value, None),
                Predicate::And(_) => {
                    return Err(QueryError::UnexpectedShape(
                        "And group inside model filter".to_string(),
                    ));
                }
            };

            if CHAIN_ORDER.get(position) != Some(&field) {
                return Err(QueryError::UnexpectedShape(format!(
                    "{field} at model filter depth {}",
                    position + 1
                )));
            }

            let value = value.clone();
            match field {
                Field::CarType => spec.country = value,
                Field::Manufacturer => spec.manufacturer = value,
                Field::ModelGroup => spec.model_group = value,
                Field::Model => spec.model = value,
                Field::BadgeGroup => spec.badge_group = Some(value),
                Field::Badge => spec.badge = Some(value),
                Field::BadgeDetail => spec.badge_details.push(value),
                Field::Hidden | Field::Options => {}
            }

            position += 1;
            match refine {
                Some(inner) => node = inner,
                None => break,
            }
        }

        if spec.model.is_empty() {
            return Err(QueryError::MissingField("model"));
        }

        Ok(spec)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// A trailing `_` would escape the `.` that terminates the value.
fn check_encodable(field: Field, value: &str) -> Result<()> {
    if value.ends_with('_') {
        return Err(QueryError::UnencodableValue {
            field: field.as_str(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// A search URL read back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSearch {
    pub spec: SearchQuerySpec,
    pub sort: String,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPayload {
    action: String,
    #[serde(default)]
    toggle: Map<String, Value>,
    #[serde(default)]
    layer: String,
    #[serde(default)]
    sort: String,
    #[serde(default = "first_page")]
    page: u32,
    #[serde(deserialize_with = "number_or_numeric_string")]
    limit: u32,
    #[serde(default)]
    search_key: String,
    #[serde(default)]
    login_check: bool,
}

const fn first_page() -> u32 {
    1
}

/// The site stores `limit` either as a number or as a numeric string.
fn number_or_numeric_string<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Limit {
        Number(u32),
        Text(String),
    }

    match Limit::deserialize(deserializer)? {
        Limit::Number(limit) => Ok(limit),
        Limit::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Builds the search URL for `spec`, requesting `page_limit` rows per page.
pub fn encode_search_url(spec: &SearchQuerySpec, page_limit: u32) -> Result<String> {
    let payload = SearchPayload {
        action: spec.to_predicate()?.to_string(),
        toggle: Map::new(),
        layer: String::new(),
        sort: DEFAULT_SORT.to_string(),
        page: first_page(),
        limit: page_limit,
        search_key: String::new(),
        login_check: false,
    };

    let json = serde_json::to_string(&payload)?;
    Ok(format!(
        "{SEARCH_BASE_URL}{FRAGMENT_MARKER}{}",
        encode_component(&json)
    ))
}

/// Reads a search URL back into a [`SearchQuerySpec`] and paging settings.
pub fn decode_search_url(url: &str) -> Result<DecodedSearch> {
    let (_, encoded) = url
        .split_once(FRAGMENT_MARKER)
        .ok_or(QueryError::MissingMarker)?;
    let json = urlencoding::decode(encoded)?;
    let payload: SearchPayload = serde_json::from_str(&json)?;
    let predicate = Predicate::parse(&payload.action)?;

    Ok(DecodedSearch {
        spec: SearchQuerySpec::from_predicate(&predicate)?,
        sort: payload.sort,
        page: payload.page,
        limit: payload.limit,
    })
}

/// Human-readable form of a search URL: the payload is pretty-printed JSON
/// when it parses, the percent-decoded text when it does not, and the input
/// itself when it cannot be decoded.
pub fn pretty_print_url(url: &str) -> String {
    let Some((base, encoded)) = url.split_once(FRAGMENT_MARKER) else {
        return urlencoding::decode(url).map_or_else(|_| url.to_string(), Cow::into_owned);
    };

    let Ok(decoded) = urlencoding::decode(encoded) else {
        return url.to_string();
    };

    match serde_json::from_str::<Value>(&decoded).and_then(|v| serde_json::to_string_pretty(&v)) {
        Ok(pretty) => format!("{base}{FRAGMENT_MARKER}\n{pretty}"),
        Err(_) => format!("{base}{FRAGMENT_MARKER}{decoded}"),
    }
}

/// Rewrites the payload's `limit`, keeping every other member and the
/// limit's JSON type. URLs without a payload, or with one that cannot be
/// read, are returned unchanged.
pub fn set_page_limit(url: &str, limit: u32) -> String {
    let Some((base, encoded)) = url.split_once(FRAGMENT_MARKER) else {
        return url.to_string();
    };

    match rewrite_limit(encoded, limit) {
        Ok(encoded) => format!("{base}{FRAGMENT_MARKER}{encoded}"),
        Err(e) => {
            warn!("Could not set page limit on search URL: {}", e);
            url.to_string()
        }
    }
}

fn rewrite_limit(encoded: &str, limit: u32) -> Result<String> {
    let decoded = urlencoding::decode(encoded)?;
    let mut payload: Map<String, Value> = serde_json::from_str(&decoded)?;

    let value = match payload.get("limit") {
        Some(Value::String(_)) => Value::String(limit.to_string()),
        _ => Value::from(limit),
    };
    payload.insert("limit".to_string(), value);

    Ok(encode_component(&serde_json::to_string(&payload)?))
}

/// Percent-encodes `text` the way the site's own scripts do.
fn encode_component(text: &str) -> String {
    let mut encoded = urlencoding::encode(text).into_owned();
    for (escape, mark) in URI_COMPONENT_MARKS {
        encoded = encoded.replace(escape, mark);
    }
    encoded
}

/// Detail page URL for a listing id.
pub fn detail_url(id: &str) -> String {
    format!("{DETAIL_BASE_URL}{id}")
}

/// Pulls the listing id out of a detail page link.
///
/// Understands the legacy `dc_cardetailview.do?carid=<id>` form and the
/// `/cars/detail/<id>` form; anything else yields `None`.
pub fn extract_listing_id(url: &str) -> Option<String> {
    let url = url.split('#').next().unwrap_or(url);

    let id = if url.contains(LEGACY_DETAIL_PAGE) {
        let (_, query) = url.split_once('?')?;
        let (_, raw) = query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == LEGACY_ID_PARAM)?;
        urlencoding::decode(raw).ok()?.into_owned()
    } else if url.contains(DETAIL_PATH) {
        let last = url.rsplit('/').next()?;
        last.split('?').next()?.to_string()
    } else {
        return None;
    };

    (!id.is_empty()).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Captured from the site's own search form.
    const STINGER_URL: &str = "http://www.encar.com/dc/dc_carsearchlist.do?carType=kor#!%7B%22action%22%3A%22(And.Hidden.N._.(C.CarType.Y._.(C.Manufacturer.%EA%B8%B0%EC%95%84._.(C.ModelGroup.%EC%8A%A4%ED%8C%85%EC%96%B4._.(C.Model.%EC%8A%A4%ED%8C%85%EC%96%B4._.(C.BadgeGroup.%EA%B0%80%EC%86%94%EB%A6%B0%202000cc._.Badge.2_.0%20%ED%84%B0%EB%B3%B4%202WD.))))))%22%2C%22toggle%22%3A%7B%7D%2C%22layer%22%3A%22%22%2C%22sort%22%3A%22ModifiedDate%22%2C%22page%22%3A1%2C%22limit%22%3A20%2C%22searchKey%22%3A%22%22%2C%22loginCheck%22%3Afalse%7D";

    /// Site URL with equipment options and a string-typed limit.
    const OPTIONS_URL: &str = "http://www.encar.com/dc/dc_carsearchlist.do?carType=kor#!%7B%22action%22%3A%22(And.Hidden.N._.Options.%ED%81%AC%EB%A3%A8%EC%A6%88%20%EC%BB%A8%ED%8A%B8%EB%A1%A4(%EC%96%B4%EB%8C%91%ED%8B%B0%EB%B8%8C_)._.Options.360%EB%8F%84%20%EC%96%B4%EB%9D%BC%EC%9A%B4%EB%93%9C%20%EB%B7%B0._.(C.CarType.Y._.(C.Manufacturer.%EA%B8%B0%EC%95%84._.(C.ModelGroup.%EC%8A%A4%ED%8C%85%EC%96%B4._.(C.Model.%EC%8A%A4%ED%8C%85%EC%96%B4._.BadgeGroup.%EA%B0%80%EC%86%94%EB%A6%B0%202000cc.)))))%22%2C%22toggle%22%3A%7B%7D%2C%22layer%22%3A%22%22%2C%22sort%22%3A%22ModifiedDate%22%2C%22page%22%3A1%2C%22limit%22%3A%22300%22%2C%22searchKey%22%3A%22%22%2C%22loginCheck%22%3Afalse%7D";

    fn stinger() -> SearchQuerySpec {
        SearchQuerySpec {
            country: "Y".to_string(),
            manufacturer: "기아".to_string(),
            model_group: "스팅어".to_string(),
            model: "스팅어".to_string(),
            badge_group: Some("가솔린 2000cc".to_string()),
            badge: Some("2.0 터보 2WD".to_string()),
            ..SearchQuerySpec::default()
        }
    }

    #[test]
    fn encode_matches_site_url_byte_for_byte() {
        assert_eq!(encode_search_url(&stinger(), 20).unwrap(), STINGER_URL);
    }

    #[test]
    fn encode_without_badges_ends_chain_at_model() {
        let spec = SearchQuerySpec {
            badge_group: None,
            badge: None,
            ..stinger()
        };
        let action = spec.to_predicate().unwrap().to_string();
        assert_eq!(
            action,
            "(And.Hidden.N._.(C.CarType.Y._.(C.Manufacturer.기아._.(C.ModelGroup.스팅어._.Model.스팅어.))))"
        );
    }

    #[test]
    fn encode_reports_alternation() {
        let spec = SearchQuerySpec {
            badge_details: vec!["플래티넘".to_string(), "드림에디션".to_string()],
            ..stinger()
        };
        let err = encode_search_url(&spec, 20).unwrap_err();
        assert!(matches!(
            err,
            QueryError::UnsupportedAlternation { count: 2, .. }
        ));
    }

    #[test]
    fn encode_reports_missing_and_orphaned_fields() {
        let spec = SearchQuerySpec {
            manufacturer: " ".to_string(),
            ..stinger()
        };
        assert!(matches!(
            spec.to_predicate(),
            Err(QueryError::MissingField("manufacturer"))
        ));

        let spec = SearchQuerySpec {
            badge_group: None,
            ..stinger()
        };
        assert!(matches!(
            spec.to_predicate(),
            Err(QueryError::Orphan { field: "badge", .. })
        ));
    }

    #[test]
    fn single_badge_detail_is_a_plain_term() {
        let spec = SearchQuerySpec {
            badge_details: vec!["플래티넘".to_string()],
            ..stinger()
        };
        let action = spec.to_predicate().unwrap().to_string();
        assert!(action.ends_with("(C.Badge.2_.0 터보 2WD._.BadgeDetail.플래티넘.)))))))"));
    }

    #[test]
    fn decode_round_trips_spec_and_limit() {
        let spec = SearchQuerySpec {
            options: vec!["선루프".to_string()],
            badge_details: vec!["플래티넘".to_string()],
            ..stinger()
        };
        let url = encode_search_url(&spec, 150).unwrap();
        let decoded = decode_search_url(&url).unwrap();

        assert_eq!(decoded.spec, spec);
        assert_eq!(decoded.limit, 150);
        assert_eq!(decoded.page, 1);
        assert_eq!(decoded.sort, DEFAULT_SORT);
    }

    #[test]
    fn decode_round_trips_values_containing_underscores() {
        let spec = SearchQuerySpec {
            model_group: "K5_DL3".to_string(),
            model: "K5_.2".to_string(),
            options: vec!["HUD_)".to_string()],
            ..stinger()
        };
        let url = encode_search_url(&spec, 20).unwrap();
        assert_eq!(decode_search_url(&url).unwrap().spec, spec);
    }

    #[test]
    fn encode_rejects_value_ending_in_underscore() {
        let spec = SearchQuerySpec {
            model_group: "K5_".to_string(),
            ..stinger()
        };
        let err = encode_search_url(&spec, 20).unwrap_err();
        assert!(matches!(
            err,
            QueryError::UnencodableValue { field: "ModelGroup", ref value } if value == "K5_"
        ));

        let spec = SearchQuerySpec {
            options: vec!["썬루프_".to_string()],
            ..stinger()
        };
        assert!(matches!(
            spec.to_predicate(),
            Err(QueryError::UnencodableValue { field: "Options", .. })
        ));
    }

    #[test]
    fn decode_reads_site_url_with_options() {
        let decoded = decode_search_url(OPTIONS_URL).unwrap();
        assert_eq!(decoded.limit, 300);
        assert_eq!(
            decoded.spec.options,
            vec!["크루즈 컨트롤(어댑티브)", "360도 어라운드 뷰"]
        );
        assert_eq!(decoded.spec.badge_group.as_deref(), Some("가솔린 2000cc"));
        assert_eq!(decoded.spec.badge, None);
    }

    #[test]
    fn set_page_limit_keeps_last_value_and_type() {
        let once = set_page_limit(OPTIONS_URL, 500);
        let twice = set_page_limit(&once, 1000);

        assert_eq!(decode_search_url(&twice).unwrap().limit, 1000);
        assert!(pretty_print_url(&twice).contains("\"limit\": \"1000\""));

        let numeric = set_page_limit(STINGER_URL, 40);
        assert!(pretty_print_url(&numeric).contains("\"limit\": 40"));
        // key order survives the rewrite
        assert_eq!(numeric, STINGER_URL.replace("%22limit%22%3A20", "%22limit%22%3A40"));
    }

    #[test]
    fn set_page_limit_leaves_other_urls_alone() {
        let plain = "http://www.encar.com/dc/dc_carsearchlist.do?carType=kor";
        assert_eq!(set_page_limit(plain, 10), plain);

        let broken = format!("{plain}#!not-json");
        assert_eq!(set_page_limit(&broken, 10), broken);
    }

    #[test]
    fn pretty_print_degrades_gracefully() {
        let pretty = pretty_print_url(STINGER_URL);
        assert!(pretty.starts_with(&format!("{SEARCH_BASE_URL}#!\n{{")));
        assert!(pretty.contains("\"action\": \"(And.Hidden.N."));
        assert!(pretty.contains("기아"));

        let raw = format!("{SEARCH_BASE_URL}#!%28And.Hidden");
        assert_eq!(pretty_print_url(&raw), format!("{SEARCH_BASE_URL}#!(And.Hidden"));

        let invalid = format!("{SEARCH_BASE_URL}#!%FF%FE");
        assert_eq!(pretty_print_url(&invalid), invalid);

        assert_eq!(pretty_print_url("a%20b"), "a b");
    }

    #[test]
    fn decode_rejects_urls_without_payload() {
        assert!(matches!(
            decode_search_url(SEARCH_BASE_URL),
            Err(QueryError::MissingMarker)
        ));
    }

    #[test]
    fn extracts_ids_from_supported_links() {
        assert_eq!(
            extract_listing_id(
                "http://www.encar.com/dc/dc_cardetailview.do?pageid=dc_carsearch&carid=38201923&listAdvType=pic"
            ),
            Some("38201923".to_string())
        );
        assert_eq!(
            extract_listing_id("https://fem.encar.com/cars/detail/38201923?pageid=dc_carsearch"),
            Some("38201923".to_string())
        );
        assert_eq!(extract_listing_id(&detail_url("41")), Some("41".to_string()));
    }

    #[test]
    fn unsupported_links_yield_none() {
        assert_eq!(extract_listing_id("https://www.encar.com/index.do"), None);
        assert_eq!(
            extract_listing_id("http://www.encar.com/dc/dc_cardetailview.do?pageid=x"),
            None
        );
        assert_eq!(extract_listing_id("https://fem.encar.com/cars/detail/"), None);
        assert_eq!(extract_listing_id(""), None);
    }
}
