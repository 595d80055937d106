//! Locator to WebDriver location-strategy translation

use action_primitives::{DriverError, Locator, LocatorQuery};

use crate::model::FindElementRequest;

/// Translate a locator into a W3C find-element request.
///
/// Text and role locators become XPath; attribute locators stay CSS.
pub fn to_find_request(locator: &Locator) -> Result<FindElementRequest, DriverError> {
    let request = match locator.query() {
        LocatorQuery::Css(css) => {
            if css.is_empty() {
                return Err(DriverError::InvalidLocator(locator.to_string()));
            }
            FindElementRequest::css(css)
        }
        LocatorQuery::XPath(xpath) => {
            if xpath.is_empty() {
                return Err(DriverError::InvalidLocator(locator.to_string()));
            }
            FindElementRequest::xpath(xpath)
        }
        LocatorQuery::Attribute { name, value } => {
            FindElementRequest::css(format!("[{name}=\"{}\"]", css_escape(&value)))
        }
        LocatorQuery::Text { value, exact } => {
            if value.trim().is_empty() {
                return Err(DriverError::InvalidLocator(locator.to_string()));
            }
            FindElementRequest::xpath(text_xpath(&value, exact))
        }
        LocatorQuery::Role { role, name } => {
            if role.is_empty() {
                return Err(DriverError::InvalidLocator(locator.to_string()));
            }
            FindElementRequest::xpath(role_xpath(&role, name.as_deref()))
        }
    };
    Ok(request)
}

/// Innermost element whose normalized text matches
fn text_xpath(value: &str, exact: bool) -> String {
    let literal = xpath_literal(value.trim());
    let test = if exact {
        format!("normalize-space(.)={literal}")
    } else {
        format!("contains(normalize-space(.), {literal})")
    };
    format!("//*[{test}][not(.//*[{test}])]")
}

fn role_xpath(role: &str, name: Option<&str>) -> String {
    let role_literal = xpath_literal(role);
    let mut tests = vec![format!("@role={role_literal}")];
    tests.extend(implicit_role_tests(role).iter().map(|t| t.to_string()));
    let mut xpath = format!("//*[{}]", tests.join(" or "));
    if let Some(name) = name {
        let literal = xpath_literal(name.trim());
        xpath.push_str(&format!(
            "[normalize-space(.)={literal} or @aria-label={literal} or @value={literal} \
             or @title={literal} or @placeholder={literal}]"
        ));
    }
    xpath
}

/// Elements that carry a role without an explicit attribute
fn implicit_role_tests(role: &str) -> &'static [&'static str] {
    match role {
        "button" => &[
            "self::button",
            "self::input[@type='submit' or @type='button' or @type='reset']",
        ],
        "link" => &["self::a[@href]"],
        "textbox" => &[
            "self::textarea",
            "self::input[not(@type) or @type='text' or @type='email' or @type='password' \
             or @type='search' or @type='tel' or @type='url']",
        ],
        "heading" => &[
            "self::h1", "self::h2", "self::h3", "self::h4", "self::h5", "self::h6",
        ],
        "checkbox" => &["self::input[@type='checkbox']"],
        "radio" => &["self::input[@type='radio']"],
        "combobox" | "listbox" => &["self::select"],
        "option" => &["self::option"],
        "img" => &["self::img"],
        _ => &[],
    }
}

/// Quote a string as an XPath 1.0 literal, falling back to `concat()` when
/// it holds both quote kinds.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

fn css_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// XPath for an `<option>` under a select element, by label or value
pub fn option_xpath(option: &str) -> String {
    let literal = xpath_literal(option.trim());
    format!(".//option[normalize-space(.)={literal} or @value={literal}]")
}
