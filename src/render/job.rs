//! Render job description: what to print and how.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value, json};

// ============================================================================
// ContentSource
// ============================================================================

/// What the page session should load before printing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Navigate to a URL and wait for its frame to stop loading.
    Url(String),
    /// Inject markup into the blank target and wait for the load event.
    InlineHtml(String),
}

// ============================================================================
// PrintParameters
// ============================================================================

/// Caller-controlled subset of `Page.printToPDF` parameters.
///
/// Unset fields are omitted from the call so the browser applies its
/// own defaults. Header and footer handling follows the DevTools
/// quirk: setting either one enables `displayHeaderFooter`, and the
/// unset counterpart is forced to a single space because an empty
/// template makes Chrome print its built-in one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrintParameters {
    /// Paper orientation.
    pub landscape: Option<bool>,
    /// Page scale factor.
    pub scale: Option<f64>,
    /// Paper width in inches.
    pub paper_width: Option<f64>,
    /// Paper height in inches.
    pub paper_height: Option<f64>,
    /// Top margin in inches.
    pub margin_top: Option<f64>,
    /// Bottom margin in inches.
    pub margin_bottom: Option<f64>,
    /// Left margin in inches.
    pub margin_left: Option<f64>,
    /// Right margin in inches.
    pub margin_right: Option<f64>,
    /// Page ranges to print, e.g. `1-5, 8`.
    pub page_ranges: Option<String>,
    /// HTML template for the page header.
    pub header_template: Option<String>,
    /// HTML template for the page footer.
    pub footer_template: Option<String>,
    /// Prefer page size as defined by CSS.
    pub prefer_css_page_size: Option<bool>,
}

impl PrintParameters {
    /// Creates parameters with every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the paper orientation.
    #[must_use]
    pub fn landscape(mut self, landscape: bool) -> Self {
        self.landscape = Some(landscape);
        self
    }

    /// Sets the page scale factor.
    #[must_use]
    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Sets the paper size in inches.
    #[must_use]
    pub fn paper_size(mut self, width: f64, height: f64) -> Self {
        self.paper_width = Some(width);
        self.paper_height = Some(height);
        self
    }

    /// Sets all four margins in inches.
    #[must_use]
    pub fn margins(mut self, top: f64, right: f64, bottom: f64, left: f64) -> Self {
        self.margin_top = Some(top);
        self.margin_right = Some(right);
        self.margin_bottom = Some(bottom);
        self.margin_left = Some(left);
        self
    }

    /// Sets the page ranges to print.
    #[must_use]
    pub fn page_ranges(mut self, ranges: impl Into<String>) -> Self {
        self.page_ranges = Some(ranges.into());
        self
    }

    /// Sets the header template.
    #[must_use]
    pub fn header_template(mut self, template: impl Into<String>) -> Self {
        self.header_template = Some(template.into());
        self
    }

    /// Sets the footer template.
    #[must_use]
    pub fn footer_template(mut self, template: impl Into<String>) -> Self {
        self.footer_template = Some(template.into());
        self
    }

    /// Sets whether the CSS page size wins over the paper size.
    #[must_use]
    pub fn prefer_css_page_size(mut self, prefer: bool) -> Self {
        self.prefer_css_page_size = Some(prefer);
        self
    }

    /// Renders the parameters as a `Page.printToPDF` params object.
    #[must_use]
    pub fn to_cdp_params(&self) -> Value {
        let mut params = Map::new();
        let mut set = |key: &str, value: Option<Value>| {
            if let Some(value) = value {
                params.insert(key.to_string(), value);
            }
        };

        set("landscape", self.landscape.map(Value::from));
        set("scale", self.scale.map(Value::from));
        set("paperWidth", self.paper_width.map(Value::from));
        set("paperHeight", self.paper_height.map(Value::from));
        set("marginTop", self.margin_top.map(Value::from));
        set("marginBottom", self.margin_bottom.map(Value::from));
        set("marginLeft", self.margin_left.map(Value::from));
        set("marginRight", self.margin_right.map(Value::from));
        set("pageRanges", self.page_ranges.clone().map(Value::from));
        set(
            "preferCSSPageSize",
            self.prefer_css_page_size.map(Value::from),
        );

        if self.header_template.is_some() || self.footer_template.is_some() {
            params.insert("displayHeaderFooter".to_string(), json!(true));
            // An empty template makes Chrome fall back to its built-in
            // header/footer, so the absent side gets a blank one.
            params.insert(
                "headerTemplate".to_string(),
                json!(self.header_template.as_deref().unwrap_or(" ")),
            );
            params.insert(
                "footerTemplate".to_string(),
                json!(self.footer_template.as_deref().unwrap_or(" ")),
            );
        }

        Value::Object(params)
    }
}

// ============================================================================
// RenderJob
// ============================================================================

/// One PDF render: a content source plus print parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    /// What to load.
    pub source: ContentSource,
    /// How to print it.
    pub parameters: PrintParameters,
}

impl RenderJob {
    /// Renders the document behind a URL.
    #[must_use]
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            source: ContentSource::Url(url.into()),
            parameters: PrintParameters::default(),
        }
    }

    /// Renders an inline HTML document.
    #[must_use]
    pub fn from_html(html: impl Into<String>) -> Self {
        Self {
            source: ContentSource::InlineHtml(html.into()),
            parameters: PrintParameters::default(),
        }
    }

    /// Replaces the print parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: PrintParameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// `true` for inline documents, which get the print-media layout
    /// pass before printing.
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self.source, ContentSource::InlineHtml(_))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_parameters_render_empty_object() {
        assert_eq!(PrintParameters::new().to_cdp_params(), json!({}));
    }

    #[test]
    fn test_set_fields_use_cdp_names() {
        let params = PrintParameters::new()
            .landscape(true)
            .scale(0.8)
            .paper_size(8.27, 11.69)
            .margins(0.4, 0.4, 0.4, 0.4)
            .page_ranges("1-2")
            .prefer_css_page_size(true)
            .to_cdp_params();

        assert_eq!(
            params,
            json!({
                "landscape": true,
                "scale": 0.8,
                "paperWidth": 8.27,
                "paperHeight": 11.69,
                "marginTop": 0.4,
                "marginRight": 0.4,
                "marginBottom": 0.4,
                "marginLeft": 0.4,
                "pageRanges": "1-2",
                "preferCSSPageSize": true,
            })
        );
    }

    #[test]
    fn test_header_enables_display_and_blanks_footer() {
        let params = PrintParameters::new()
            .header_template("<span class=title></span>")
            .to_cdp_params();

        assert_eq!(params["displayHeaderFooter"], true);
        assert_eq!(params["headerTemplate"], "<span class=title></span>");
        assert_eq!(params["footerTemplate"], " ");
    }

    #[test]
    fn test_footer_alone_blanks_header() {
        let params = PrintParameters::new()
            .footer_template("<span class=pageNumber></span>")
            .to_cdp_params();

        assert_eq!(params["displayHeaderFooter"], true);
        assert_eq!(params["headerTemplate"], " ");
        assert_eq!(params["footerTemplate"], "<span class=pageNumber></span>");
    }

    #[test]
    fn test_job_inline_detection() {
        assert!(RenderJob::from_html("<p>hi</p>").is_inline());
        assert!(!RenderJob::from_url("http://localhost/").is_inline());
    }
}
