//! Element locations in the sign-in flow and the map editor.
//!
//! Lists are ordered fallbacks: the first locator that matches wins.

use std::sync::OnceLock;

use map_driver::Locator;
use regex::Regex;

// ---------------------------------------------------------------------------
// Sign-in
// ---------------------------------------------------------------------------

pub fn identity_fields() -> Vec<Locator> {
    vec![
        Locator::name("identifier"),
        Locator::id("identifierId"),
        Locator::css(r#"input[type="email"]"#),
        Locator::xpath(r#"//input[@type="email"]"#),
    ]
}

pub fn identity_next() -> Vec<Locator> {
    next_buttons("identifierNext")
}

pub fn secret_fields() -> Vec<Locator> {
    vec![
        Locator::name("Passwd"),
        Locator::name("password"),
        Locator::css(r#"input[type="password"]"#),
        Locator::xpath(r#"//input[@type="password"]"#),
    ]
}

pub fn secret_next() -> Vec<Locator> {
    next_buttons("passwordNext")
}

fn next_buttons(id: &str) -> Vec<Locator> {
    vec![
        Locator::id(id),
        Locator::xpath(format!(r#"//div[@id="{id}"]//button"#)),
        Locator::xpath(r#"//span[text()="Next"]//parent::button"#),
        Locator::css(r#"button[type="button"]"#),
    ]
}

/// Post-login URL check: inside the map product, off the sign-in pages.
pub fn signed_in(url: &str) -> bool {
    url.contains("maps") && !url.contains("signin")
}

// ---------------------------------------------------------------------------
// Editor
// ---------------------------------------------------------------------------

pub fn edit_controls() -> Vec<Locator> {
    vec![
        Locator::xpath(
            r#"//*[@id="legendPanel"]/div/div/div[2]/div/div/div[1]/div[4]/div/div[2]/span/span"#,
        ),
        Locator::xpath(r#"//span[contains(text(),"編輯")]"#),
        Locator::xpath(r#"//button[contains(text(),"編輯")]"#),
    ]
}

pub fn layer_status() -> Locator {
    Locator::xpath(r#"//*[@id="ly0-layer-status"]/span/div"#)
}

pub fn layer_menu() -> Locator {
    Locator::xpath(r#"//*[@id="ly0-layer-header"]/div[3]"#)
}

pub fn delete_layer_entry() -> Locator {
    Locator::text("刪除這個圖層")
}

pub fn confirm_delete() -> Locator {
    Locator::name("delete")
}

pub fn unnamed_layer() -> Locator {
    Locator::text("(未命名的圖層)")
}

pub fn rename_input() -> Locator {
    Locator::xpath(r#"//*[@id=":2w.contentEl"]/input"#)
}

pub fn save_name() -> Locator {
    Locator::name("save")
}

pub fn import_link() -> Locator {
    Locator::xpath(r#"//*[@id="ly0-layerview-import-link"]"#)
}

pub fn upload_frame(frame_id: &str) -> Locator {
    Locator::xpath(format!(r#"//iframe[@id="{frame_id}"]"#))
}

pub fn file_input() -> Locator {
    Locator::css(r#"input[type="file"]"#)
}

/// Checkbox + radio pairs binding the latitude and longitude columns.
pub fn coordinate_columns() -> [Locator; 4] {
    [
        Locator::xpath(r#"//*[@id="upload-checkbox-5"]/span/div"#),
        Locator::xpath(r#"//*[@id="upload-location-radio-5-0"]/div[2]/span[1]"#),
        Locator::xpath(r#"//*[@id="upload-checkbox-6"]/span/div"#),
        Locator::xpath(r#"//*[@id="upload-location-radio-6-1"]/div/span[1]"#),
    ]
}

pub fn import_continue() -> Locator {
    Locator::xpath("/html/body/div[9]/div[3]/button[1]")
}

pub fn title_column() -> Locator {
    Locator::xpath(r#"//*[@id="upload-radio-3"]/div/span[1]"#)
}

pub fn import_done() -> Locator {
    Locator::xpath("/html/body/div[7]/div[3]/button[1]")
}

pub fn style_link() -> Locator {
    Locator::xpath(r#"//*[@id="ly0-layerview-stylepopup-link"]/div[2]/div"#)
}

pub fn style_by_value() -> Locator {
    Locator::xpath(r#"//*[@id="layer-style-popup"]/div[3]/div[1]"#)
}

/// Priority column, string-typed first, numeric-typed as fallback.
pub fn style_priority_column() -> Vec<Locator> {
    vec![
        Locator::xpath(r#"//*[@id="style-by-type-selector-column-str:5qGI5Lu26aGe5Z6L"]/div"#),
        Locator::xpath(r#"//*[@id="style-by-type-selector-column-double:5qGI5Lu26aGe5Z6L"]/div"#),
    ]
}

pub fn style_close() -> Locator {
    Locator::xpath(r#"//*[@id="layer-style-popup"]/div[1]"#)
}

pub fn layer_items() -> Locator {
    Locator::xpath(r#"//*[@id="ly0-layer-items-container"]"#)
}

// ---------------------------------------------------------------------------
// Upload frame discovery
// ---------------------------------------------------------------------------

static FRAME_RE: OnceLock<Regex> = OnceLock::new();

fn frame_re() -> &'static Regex {
    FRAME_RE.get_or_init(|| {
        Regex::new(r#"(?s)class="fFW7wc XKSfm-Sx9Kwc-bN97Pc[^"]*"[^>]*>\s*<iframe\b[^>]*?\bid="([^"]+)""#)
            .expect("static regex")
    })
}

/// Id of the generated upload iframe inside the import dialog.
pub fn upload_frame_id(page_source: &str) -> Option<String> {
    frame_re()
        .captures(page_source)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
