//! Canned response templates.
//!
//! The catalog is an ordered, immutable list built once at startup. Order is
//! significant: the matcher breaks score ties in favor of the earlier template.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::CatalogError;
use crate::pipeline::keywords::KeywordCase;
use crate::pipeline::types::Keyword;

/// A keyword set and the reply sent when it matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    required_keywords: BTreeSet<Keyword>,
    response_text: String,
}

impl Template {
    pub fn required_keywords(&self) -> &BTreeSet<Keyword> {
        &self.required_keywords
    }

    pub fn response_text(&self) -> &str {
        &self.response_text
    }
}

/// Authored form of a template, as written in config.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateSpec {
    pub keywords: Vec<String>,
    pub response: String,
}

impl TemplateSpec {
    pub fn new(keywords: &[&str], response: &str) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            response: response.to_string(),
        }
    }
}

/// On-disk catalog: a TOML file of `[[template]]` tables.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "template", default)]
    templates: Vec<TemplateSpec>,
}

/// Ordered, validated template list.
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: Vec<Template>,
}

impl TemplateCatalog {
    /// Validate and build a catalog, preserving authored order.
    ///
    /// Keywords are trimmed. Rejects empty keyword lists, blank keywords,
    /// keywords with inner whitespace (no extracted token can ever equal
    /// them), empty responses and templates whose keyword set (after case
    /// normalization) repeats an earlier one.
    pub fn from_specs(specs: Vec<TemplateSpec>, case: KeywordCase) -> Result<Self, CatalogError> {
        if specs.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut seen: HashMap<BTreeSet<Keyword>, usize> = HashMap::new();
        let mut templates = Vec::with_capacity(specs.len());

        for (index, spec) in specs.into_iter().enumerate() {
            if spec.keywords.is_empty() {
                return Err(CatalogError::EmptyKeywords { index });
            }
            if spec.keywords.iter().any(|k| k.trim().is_empty()) {
                return Err(CatalogError::BlankKeyword { index });
            }
            if spec.response.trim().is_empty() {
                return Err(CatalogError::EmptyResponse { index });
            }

            if let Some(keyword) = spec
                .keywords
                .iter()
                .map(|k| k.trim())
                .find(|k| k.chars().any(char::is_whitespace))
            {
                return Err(CatalogError::InvalidKeyword {
                    index,
                    keyword: keyword.to_string(),
                });
            }

            let required_keywords: BTreeSet<Keyword> =
                spec.keywords.iter().map(|k| case.apply(k.trim())).collect();

            if let Some(&first) = seen.get(&required_keywords) {
                return Err(CatalogError::DuplicateKeywords {
                    index,
                    first,
                    keywords: required_keywords.into_iter().collect(),
                });
            }
            seen.insert(required_keywords.clone(), index);

            templates.push(Template {
                required_keywords,
                response_text: spec.response,
            });
        }

        Ok(Self { templates })
    }

    /// The built-in customer-support catalog.
    pub fn builtin(case: KeywordCase) -> Result<Self, CatalogError> {
        let specs = BUILTIN_TEMPLATES
            .iter()
            .map(|(keywords, response)| TemplateSpec::new(keywords, response))
            .collect();
        Self::from_specs(specs, case)
    }

    /// Parse a TOML catalog. `origin` names the source in errors.
    pub fn from_toml_str(
        content: &str,
        origin: &str,
        case: KeywordCase,
    ) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(content).map_err(|e| CatalogError::Parse {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_specs(file.templates, case)
    }

    /// Read and parse a TOML catalog file.
    pub fn from_file(path: &Path, case: KeywordCase) -> Result<Self, CatalogError> {
        let origin = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: origin.clone(),
            source,
        })?;
        Self::from_toml_str(&content, &origin, case)
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn get(&self, index: usize) -> Option<&Template> {
        self.templates.get(index)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

/// Load the catalog from `path`, or the built-in one when no path is given.
pub fn load_templates(path: Option<&Path>, case: KeywordCase) -> Result<TemplateCatalog, CatalogError> {
    let catalog = match path {
        Some(path) => TemplateCatalog::from_file(path, case)?,
        None => TemplateCatalog::builtin(case)?,
    };
    info!(
        templates = catalog.len(),
        source = %path.map(|p| p.display().to_string()).unwrap_or_else(|| "built-in".into()),
        "Loaded template catalog"
    );
    Ok(catalog)
}

// ── Built-in catalog ────────────────────────────────────────────────

const BUILTIN_TEMPLATES: &[(&[&str], &str)] = &[
    (
        &["order", "not", "updated"],
        "We apologize for the delay in updating your order. Our team will look into it and update you as soon as possible. Please provide your order number.",
    ),
    (
        &["where", "tracking", "number"],
        "We apologize for the delay in providing your tracking number. We'll send it to you as soon as it's available. Please provide your order number.",
    ),
    (
        &["etransfer", "accepted"],
        "We're currently processing your e-transfer. You'll receive a confirmation email once it's been accepted. If you don't receive the confirmation within 24 hours, please contact us with your order number.",
    ),
    (
        &["order", "shipped"],
        "We typically ship orders within 1-2 business days after payment has been accepted. You'll receive a tracking number once your order has been shipped. If there's any delay, please provide your order number so we can check the status.",
    ),
    (
        &["accepted", "e-transfer", "order", "on-hold"],
        "We apologize for the confusion. We'll update your order status as soon as possible. Please provide your order number.",
    ),
    (
        &["e-transfer", "not", "accepted"],
        "We're sorry for the delay in accepting your e-transfer. Please provide your order number and we'll investigate the issue.",
    ),
    (
        &["tracking", "not", "updated"],
        "We apologize for the delay in updating your tracking information. Please provide your order number, and we'll look into the issue and update you as soon as possible.",
    ),
    (
        &["tracking"],
        "We apologize for the delay in providing your tracking number. We'll send it to you as soon as it's available. Please provide your order number.",
    ),
    (
        &["order", "completed"],
        "We typically process orders within 1-2 business days after payment has been accepted. If you haven't received any updates on your order, please provide your order number so we can check the status.",
    ),
    (
        &["no", "confirmation", "order"],
        "We apologize for the lack of confirmation on your order. We'll look into the issue and update you as soon as possible. Please provide your order number.",
    ),
    (
        &["missing", "item", "order"],
        "We're sorry that an item is missing from your order. We'll send the missing item right away. Please share your order number and the missing item's details.",
    ),
    (
        &["order", "still", "on", "hold"],
        "We apologize for the delay in processing your order. We'll investigate the issue and update the status as soon as possible. Please provide your order number.",
    ),
    (
        &["status", "order"],
        "We apologize for any confusion regarding your order status. Please provide your order number, and we'll update you with the current status.",
    ),
    (
        &["pack", "delivered", "not", "received"],
        "We're sorry that you haven't received your package even though it's marked as delivered. We'll investigate the issue and get back to you as soon as possible. Please provide your order number and shipping address.",
    ),
    (
        &["pack", "delayed"],
        "We apologize for the delay in your package's delivery. Please provide your order number and tracking number, and we'll look into the issue.",
    ),
    (
        &["pack", "wrong", "address"],
        "We're sorry that your package was delivered to the wrong address. We'll arrange to resend your order to the correct address. Please provide your order number and the correct shipping address.",
    ),
    (
        &["wrong", "order", "received"],
        "We apologize for the mix-up in your order. We'll arrange to send the correct items immediately. Please provide your order number and a photo of the items you received.",
    ),
    (
        &["e-transfer", "pending"],
        "We're sorry for the delay in processing your e-transfer. We'll look into the issue and update you as soon as possible. Please provide your order number.",
    ),
    (
        &["lootly", "points", "update", "purchase"],
        "We apologize for the issue with your Lootly points not updating. We'll resolve the issue and update your points accordingly. Please provide your order number and the email address associated with your Lootly account.",
    ),
    (
        &["rewards", "widget", "website"],
        "We're sorry for the inconvenience. The rewards widget should be visible on our website. Please try clearing your browser cache or using a different browser. If the issue persists, contact us with your device and browser details.",
    ),
    (
        &["received", "smalls", "regulars"],
        "We apologize for the mix-up in your order. We'll send the correct regular-sized product as soon as possible. Please provide your order number and a photo of the product you received.",
    ),
];
