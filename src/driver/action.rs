//! The uniform action-dispatch layer.
//!
//! An [`Action`] is a caller-constructed descriptor consumed once per
//! dispatch. Validation of the descriptor happens before any protocol
//! traffic; most kinds then execute against a resolved page handle, while
//! `resize` goes straight over the target's debug WebSocket.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams, SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    Headers, SetExtraHttpHeadersParams, SetUserAgentOverrideParams,
};
use chromiumoxide::page::Page;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;

use super::{cdp, DriverSession};
use crate::error::{DriverError, Result};

const DEFAULT_WAIT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_VIEWPORT: (i64, i64) = (1280, 720);

/// One interactive operation against a target
#[derive(Debug, Clone)]
pub enum Action {
    Click(ClickAction),
    Type(TypeAction),
    Press(PressAction),
    Hover(HoverAction),
    Drag(DragAction),
    Select(SelectAction),
    Fill(FillAction),
    Wait(WaitAction),
    Resize(ResizeAction),
    Evaluate(EvaluateAction),
    Close,
    Device(DeviceAction),
    Geolocation(GeolocationAction),
    Timezone(TimezoneAction),
    Headers(HeadersAction),
    Unknown { kind: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickAction {
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub button: Option<String>,
    #[serde(default)]
    pub double_click: bool,
    #[serde(default)]
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeAction {
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub submit: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PressAction {
    pub key: Option<String>,
    #[serde(default)]
    pub slowly: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoverAction {
    #[serde(rename = "ref")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragAction {
    pub start_ref: Option<String>,
    pub end_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectAction {
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValue {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillAction {
    #[serde(default)]
    pub fields: Vec<FieldValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitAction {
    pub text: Option<String>,
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub time_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeAction {
    pub width: Option<i64>,
    pub height: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateAction {
    #[serde(rename = "fn")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAction {
    pub device: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeolocationAction {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimezoneAction {
    pub timezone_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadersAction {
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Action {
    pub fn kind(&self) -> &str {
        match self {
            Action::Click(_) => "click",
            Action::Type(_) => "type",
            Action::Press(_) => "press",
            Action::Hover(_) => "hover",
            Action::Drag(_) => "drag",
            Action::Select(_) => "select",
            Action::Fill(_) => "fill",
            Action::Wait(_) => "wait",
            Action::Resize(_) => "resize",
            Action::Evaluate(_) => "evaluate",
            Action::Close => "close",
            Action::Device(_) => "device",
            Action::Geolocation(_) => "geolocation",
            Action::Timezone(_) => "timezone",
            Action::Headers(_) => "headers",
            Action::Unknown { kind } => kind,
        }
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| D::Error::custom("action descriptor requires a 'kind' field"))?
            .to_string();

        fn payload<T: serde::de::DeserializeOwned, E: Error>(
            value: Value,
        ) -> std::result::Result<T, E> {
            serde_json::from_value(value).map_err(E::custom)
        }

        Ok(match kind.as_str() {
            "click" => Action::Click(payload(value)?),
            "type" => Action::Type(payload(value)?),
            "press" => Action::Press(payload(value)?),
            "hover" => Action::Hover(payload(value)?),
            "drag" => Action::Drag(payload(value)?),
            "select" => Action::Select(payload(value)?),
            "fill" => Action::Fill(payload(value)?),
            "wait" => Action::Wait(payload(value)?),
            "resize" => Action::Resize(payload(value)?),
            "evaluate" => Action::Evaluate(payload(value)?),
            "close" => Action::Close,
            "device" => Action::Device(payload(value)?),
            "geolocation" => Action::Geolocation(payload(value)?),
            "timezone" => Action::Timezone(payload(value)?),
            "headers" => Action::Headers(payload(value)?),
            _ => Action::Unknown { kind },
        })
    }
}

/// Reject malformed descriptors before any protocol traffic
pub(crate) fn validate(action: &Action, target: &str) -> Result<()> {
    match action {
        Action::Click(a) => required_ref(&a.reference, "click", target).map(|_| ()),
        Action::Type(a) => required_ref(&a.reference, "type", target).map(|_| ()),
        Action::Hover(a) => required_ref(&a.reference, "hover", target).map(|_| ()),
        Action::Select(a) => required_ref(&a.reference, "select", target).map(|_| ()),
        Action::Drag(a) => {
            required_ref(&a.start_ref, "drag", target)?;
            required_ref(&a.end_ref, "drag", target).map(|_| ())
        }
        Action::Unknown { kind } => Err(DriverError::UnsupportedAction {
            kind: kind.clone(),
            target: target.to_string(),
        }),
        _ => Ok(()),
    }
}

fn required_ref<'a>(reference: &'a Option<String>, kind: &str, target: &str) -> Result<&'a str> {
    reference
        .as_deref()
        .filter(|r| !r.is_empty())
        .ok_or_else(|| DriverError::MissingReference {
            kind: kind.to_string(),
            target: target.to_string(),
        })
}

/// Best-effort reference policy: all digits is an attribute-based
/// accessibility reference, `e` + digits is a role reference from snapshot
/// output, anything else passes through as a raw selector.
pub(crate) fn ref_to_selector(reference: &str) -> String {
    if !reference.is_empty() && reference.chars().all(|c| c.is_ascii_digit()) {
        format!("[aria-ref=\"{}\"]", reference)
    } else if is_role_ref(reference) {
        format!("[ref=\"{}\"]", reference)
    } else {
        reference.to_string()
    }
}

fn is_role_ref(reference: &str) -> bool {
    reference.len() > 1
        && reference.starts_with('e')
        && reference[1..].chars().all(|c| c.is_ascii_digit())
}

/// CDP input modifier bitmask: Alt=1, Ctrl=2, Meta=4, Shift=8
fn modifiers_mask(modifiers: &[String]) -> i64 {
    modifiers
        .iter()
        .map(|m| match m.to_lowercase().as_str() {
            "alt" => 1,
            "control" | "ctrl" => 2,
            "meta" | "command" | "cmd" => 4,
            "shift" => 8,
            _ => 0,
        })
        .sum()
}

fn mouse_button(name: Option<&str>) -> MouseButton {
    match name.map(str::to_lowercase).as_deref() {
        Some("right") => MouseButton::Right,
        Some("middle") => MouseButton::Middle,
        _ => MouseButton::Left,
    }
}

/// Whether an evaluate body is a function to invoke rather than a bare
/// expression.
fn looks_like_function(body: &str) -> bool {
    let trimmed = body.trim_start();
    trimmed.starts_with("function")
        || trimmed.starts_with("async ")
        || (trimmed.starts_with('(') && trimmed.contains("=>"))
}

struct KeySpec {
    key: String,
    code: String,
    text: String,
    vk: i64,
}

impl KeySpec {
    fn new(key: &str, code: &str, text: &str, vk: i64) -> Self {
        Self {
            key: key.to_string(),
            code: code.to_string(),
            text: text.to_string(),
            vk,
        }
    }
}

/// Common key names to CDP key/code/windowsVirtualKeyCode. Virtual key
/// codes follow the Windows VK standard, which CDP uses cross-platform.
fn key_spec(name: &str) -> Option<KeySpec> {
    let spec = match name.to_lowercase().as_str() {
        "enter" | "return" => KeySpec::new("Enter", "Enter", "\r", 13),
        "tab" => KeySpec::new("Tab", "Tab", "\t", 9),
        "escape" | "esc" => KeySpec::new("Escape", "Escape", "", 27),
        "backspace" => KeySpec::new("Backspace", "Backspace", "", 8),
        "delete" => KeySpec::new("Delete", "Delete", "", 46),
        "arrowup" | "up" => KeySpec::new("ArrowUp", "ArrowUp", "", 38),
        "arrowdown" | "down" => KeySpec::new("ArrowDown", "ArrowDown", "", 40),
        "arrowleft" | "left" => KeySpec::new("ArrowLeft", "ArrowLeft", "", 37),
        "arrowright" | "right" => KeySpec::new("ArrowRight", "ArrowRight", "", 39),
        "home" => KeySpec::new("Home", "Home", "", 36),
        "end" => KeySpec::new("End", "End", "", 35),
        "pageup" => KeySpec::new("PageUp", "PageUp", "", 33),
        "pagedown" => KeySpec::new("PageDown", "PageDown", "", 34),
        "space" => KeySpec::new(" ", "Space", " ", 32),
        _ => return None,
    };
    Some(spec)
}

struct DevicePreset {
    width: i64,
    height: i64,
    device_scale_factor: f64,
    mobile: bool,
    user_agent: &'static str,
}

fn device_preset(name: &str) -> Option<DevicePreset> {
    let normalized = name.to_lowercase().replace([' ', '-'], "");
    let preset = match normalized.as_str() {
        "iphone13" | "iphone" => DevicePreset {
            width: 390,
            height: 844,
            device_scale_factor: 3.0,
            mobile: true,
            user_agent: "Mozilla/5.0 (iPhone; CPU iPhone OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1",
        },
        "pixel7" | "pixel" => DevicePreset {
            width: 412,
            height: 915,
            device_scale_factor: 2.625,
            mobile: true,
            user_agent: "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Mobile Safari/537.36",
        },
        "ipad" => DevicePreset {
            width: 810,
            height: 1080,
            device_scale_factor: 2.0,
            mobile: true,
            user_agent: "Mozilla/5.0 (iPad; CPU OS 16_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.0 Mobile/15E148 Safari/604.1",
        },
        "desktop" => DevicePreset {
            width: 1920,
            height: 1080,
            device_scale_factor: 1.0,
            mobile: false,
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        },
        _ => return None,
    };
    Some(preset)
}

async fn eval_value(page: &Page, js: String) -> std::result::Result<Value, String> {
    let result = page.evaluate(js).await.map_err(|e| e.to_string())?;
    Ok(result.value().cloned().unwrap_or(Value::Null))
}

/// Scroll the element into view and return its center point
async fn element_center(
    page: &Page,
    selector: &str,
    kind: &str,
    target: &str,
) -> Result<(f64, f64)> {
    let selector_json = serde_json::to_string(selector)?;
    let js = format!(
        r#"(() => {{
            const el = document.querySelector({selector_json});
            if (!el) return null;
            el.scrollIntoView({{ behavior: 'instant', block: 'center', inline: 'center' }});
            const rect = el.getBoundingClientRect();
            return {{ x: rect.left + rect.width / 2, y: rect.top + rect.height / 2 }};
        }})()"#
    );

    let coords = eval_value(page, js)
        .await
        .map_err(|e| DriverError::for_action(kind, target, e))?;

    if coords.is_null() {
        return Err(DriverError::for_action(
            kind,
            target,
            format!("element not found: {}", selector),
        ));
    }

    let x = coords.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let y = coords.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);
    Ok((x, y))
}

async fn dispatch_mouse(
    page: &Page,
    event_type: DispatchMouseEventType,
    x: f64,
    y: f64,
    button: Option<MouseButton>,
    click_count: Option<i64>,
    modifiers: i64,
    kind: &str,
    target: &str,
) -> Result<()> {
    let mut builder = DispatchMouseEventParams::builder()
        .r#type(event_type)
        .x(x)
        .y(y);
    if let Some(button) = button {
        builder = builder.button(button);
    }
    if let Some(count) = click_count {
        builder = builder.click_count(count);
    }
    if modifiers != 0 {
        builder = builder.modifiers(modifiers);
    }

    let params = builder
        .build()
        .map_err(|e| DriverError::for_action(kind, target, e))?;
    page.execute(params)
        .await
        .map_err(|e| DriverError::for_action(kind, target, e))?;
    Ok(())
}

async fn dispatch_key(
    page: &Page,
    event_type: DispatchKeyEventType,
    spec: &KeySpec,
    kind: &str,
    target: &str,
) -> Result<()> {
    let mut builder = DispatchKeyEventParams::builder()
        .r#type(event_type.clone())
        .key(spec.key.as_str())
        .code(spec.code.as_str())
        .windows_virtual_key_code(spec.vk);
    if matches!(event_type, DispatchKeyEventType::KeyDown) && !spec.text.is_empty() {
        builder = builder.text(spec.text.as_str());
    }

    let params = builder
        .build()
        .map_err(|e| DriverError::for_action(kind, target, e))?;
    page.execute(params)
        .await
        .map_err(|e| DriverError::for_action(kind, target, e))?;
    Ok(())
}

async fn press_key(page: &Page, key: &str, slowly: bool, kind: &str, target: &str) -> Result<()> {
    // Unmapped keys pass through as-is; single characters still type
    let spec = key_spec(key).unwrap_or_else(|| KeySpec::new(key, key, key, 0));

    dispatch_key(page, DispatchKeyEventType::KeyDown, &spec, kind, target).await?;
    if slowly {
        sleep(Duration::from_millis(100)).await;
    }
    dispatch_key(page, DispatchKeyEventType::KeyUp, &spec, kind, target).await?;
    Ok(())
}

/// Clear-and-set an input's value, firing input/change so frameworks notice
async fn fill_value(page: &Page, selector: &str, text: &str, kind: &str, target: &str) -> Result<()> {
    let selector_json = serde_json::to_string(selector)?;
    let text_json = serde_json::to_string(text)?;
    let js = format!(
        r#"(() => {{
            const el = document.querySelector({selector_json});
            if (!el) return false;
            el.focus();
            el.value = {text_json};
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()"#
    );

    let filled = eval_value(page, js)
        .await
        .map_err(|e| DriverError::for_action(kind, target, e))?;
    if !filled.as_bool().unwrap_or(false) {
        return Err(DriverError::for_action(
            kind,
            target,
            format!("element not found: {}", selector),
        ));
    }
    Ok(())
}

impl DriverSession {
    /// Execute one action descriptor against a target. Returns the evaluated
    /// value for `evaluate`, `null` otherwise.
    pub async fn dispatch(&self, target_id: &str, action: &Action) -> Result<Value> {
        validate(action, target_id)?;

        tracing::debug!("Dispatching '{}' on target {}", action.kind(), target_id);

        match action {
            Action::Resize(a) => {
                // Plain resize only needs the raw protocol
                self.resize_raw(target_id, a).await?;
                Ok(Value::Null)
            }
            Action::Click(a) => {
                let reference = required_ref(&a.reference, "click", target_id)?;
                let page = self.resolve(target_id).await?;
                self.click(&page, target_id, reference, a).await?;
                Ok(Value::Null)
            }
            Action::Type(a) => {
                let reference = required_ref(&a.reference, "type", target_id)?;
                let page = self.resolve(target_id).await?;
                let selector = ref_to_selector(reference);
                fill_value(
                    &page,
                    &selector,
                    a.text.as_deref().unwrap_or(""),
                    "type",
                    target_id,
                )
                .await?;
                if a.submit {
                    if let Some(spec) = key_spec("enter") {
                        dispatch_key(&page, DispatchKeyEventType::KeyDown, &spec, "type", target_id)
                            .await?;
                        dispatch_key(&page, DispatchKeyEventType::KeyUp, &spec, "type", target_id)
                            .await?;
                    }
                }
                Ok(Value::Null)
            }
            Action::Press(a) => {
                // No key is a silent no-op
                if let Some(key) = a.key.as_deref().filter(|k| !k.is_empty()) {
                    let page = self.resolve(target_id).await?;
                    press_key(&page, key, a.slowly, "press", target_id).await?;
                }
                Ok(Value::Null)
            }
            Action::Hover(a) => {
                let reference = required_ref(&a.reference, "hover", target_id)?;
                let page = self.resolve(target_id).await?;
                let selector = ref_to_selector(reference);
                let (x, y) = element_center(&page, &selector, "hover", target_id).await?;
                dispatch_mouse(
                    &page,
                    DispatchMouseEventType::MouseMoved,
                    x,
                    y,
                    None,
                    None,
                    0,
                    "hover",
                    target_id,
                )
                .await?;
                Ok(Value::Null)
            }
            Action::Drag(a) => {
                let start = required_ref(&a.start_ref, "drag", target_id)?;
                let end = required_ref(&a.end_ref, "drag", target_id)?;
                let page = self.resolve(target_id).await?;
                self.drag(&page, target_id, start, end).await?;
                Ok(Value::Null)
            }
            Action::Select(a) => {
                let reference = required_ref(&a.reference, "select", target_id)?;
                let page = self.resolve(target_id).await?;
                self.select(&page, target_id, reference, &a.values).await?;
                Ok(Value::Null)
            }
            Action::Fill(a) => {
                let page = self.resolve(target_id).await?;
                // Per-field best effort: a bad field is logged and skipped
                for field in &a.fields {
                    let selector = ref_to_selector(&field.reference);
                    if let Err(e) =
                        fill_value(&page, &selector, &field.value, "fill", target_id).await
                    {
                        tracing::warn!("Skipping field '{}': {}", field.reference, e);
                    }
                }
                Ok(Value::Null)
            }
            Action::Wait(a) => {
                self.wait(target_id, a).await?;
                Ok(Value::Null)
            }
            Action::Evaluate(a) => {
                let body = a.body.as_deref().filter(|b| !b.is_empty()).ok_or_else(|| {
                    DriverError::Eval {
                        target: target_id.to_string(),
                        message: "evaluate requires a function body".to_string(),
                    }
                })?;
                let page = self.resolve(target_id).await?;
                self.evaluate_on_handle(&page, target_id, body).await
            }
            Action::Close => {
                let page = self.resolve(target_id).await?;
                page.close()
                    .await
                    .map_err(|e| DriverError::for_action("close", target_id, e))?;
                let mut state = self.state.lock().await;
                self.forget_target(&mut state, target_id).await;
                Ok(Value::Null)
            }
            Action::Device(a) => {
                let name = a.device.as_deref().unwrap_or_default();
                let preset = device_preset(name).ok_or_else(|| {
                    DriverError::for_action(
                        "device",
                        target_id,
                        format!("unknown device: {} (try iphone-13, pixel-7, ipad, desktop)", name),
                    )
                })?;
                let page = self.resolve(target_id).await?;
                self.emulate_device(&page, target_id, &preset).await?;
                Ok(Value::Null)
            }
            Action::Geolocation(a) => {
                let (latitude, longitude) = match (a.latitude, a.longitude) {
                    (Some(lat), Some(lon)) => (lat, lon),
                    _ => {
                        return Err(DriverError::for_action(
                            "geolocation",
                            target_id,
                            "geolocation requires latitude and longitude",
                        ))
                    }
                };
                let page = self.resolve(target_id).await?;
                let params = SetGeolocationOverrideParams::builder()
                    .latitude(latitude)
                    .longitude(longitude)
                    .accuracy(a.accuracy.unwrap_or(1.0))
                    .build();
                page.execute(params)
                    .await
                    .map_err(|e| DriverError::for_action("geolocation", target_id, e))?;
                Ok(Value::Null)
            }
            Action::Timezone(a) => {
                let timezone_id = a.timezone_id.clone().ok_or_else(|| {
                    DriverError::for_action("timezone", target_id, "timezone requires timezoneId")
                })?;
                let page = self.resolve(target_id).await?;
                page.execute(SetTimezoneOverrideParams { timezone_id })
                    .await
                    .map_err(|e| DriverError::for_action("timezone", target_id, e))?;
                Ok(Value::Null)
            }
            Action::Headers(a) => {
                let page = self.resolve(target_id).await?;
                let map: serde_json::Map<String, Value> = a
                    .headers
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                let params = SetExtraHttpHeadersParams::builder()
                    .headers(Headers::new(Value::Object(map)))
                    .build()
                    .map_err(|e| DriverError::for_action("headers", target_id, e))?;
                page.execute(params)
                    .await
                    .map_err(|e| DriverError::for_action("headers", target_id, e))?;
                Ok(Value::Null)
            }
            Action::Unknown { kind } => Err(DriverError::UnsupportedAction {
                kind: kind.clone(),
                target: target_id.to_string(),
            }),
        }
    }

    async fn click(
        &self,
        page: &Page,
        target_id: &str,
        reference: &str,
        action: &ClickAction,
    ) -> Result<()> {
        let selector = ref_to_selector(reference);
        let (x, y) = element_center(page, &selector, "click", target_id).await?;

        let button = mouse_button(action.button.as_deref());
        let count = if action.double_click { 2 } else { 1 };
        let mask = modifiers_mask(&action.modifiers);

        // Move first so the browser updates its hit-test target, then press
        // and release
        dispatch_mouse(
            page,
            DispatchMouseEventType::MouseMoved,
            x,
            y,
            None,
            None,
            mask,
            "click",
            target_id,
        )
        .await?;
        dispatch_mouse(
            page,
            DispatchMouseEventType::MousePressed,
            x,
            y,
            Some(button.clone()),
            Some(count),
            mask,
            "click",
            target_id,
        )
        .await?;
        dispatch_mouse(
            page,
            DispatchMouseEventType::MouseReleased,
            x,
            y,
            Some(button),
            Some(count),
            mask,
            "click",
            target_id,
        )
        .await?;

        Ok(())
    }

    async fn drag(&self, page: &Page, target_id: &str, start: &str, end: &str) -> Result<()> {
        let start_selector = ref_to_selector(start);
        let end_selector = ref_to_selector(end);
        let (sx, sy) = element_center(page, &start_selector, "drag", target_id).await?;
        let (ex, ey) = element_center(page, &end_selector, "drag", target_id).await?;

        dispatch_mouse(
            page,
            DispatchMouseEventType::MouseMoved,
            sx,
            sy,
            None,
            None,
            0,
            "drag",
            target_id,
        )
        .await?;
        dispatch_mouse(
            page,
            DispatchMouseEventType::MousePressed,
            sx,
            sy,
            Some(MouseButton::Left),
            Some(1),
            0,
            "drag",
            target_id,
        )
        .await?;
        dispatch_mouse(
            page,
            DispatchMouseEventType::MouseMoved,
            ex,
            ey,
            Some(MouseButton::Left),
            None,
            0,
            "drag",
            target_id,
        )
        .await?;
        dispatch_mouse(
            page,
            DispatchMouseEventType::MouseReleased,
            ex,
            ey,
            Some(MouseButton::Left),
            Some(1),
            0,
            "drag",
            target_id,
        )
        .await?;

        Ok(())
    }

    async fn select(
        &self,
        page: &Page,
        target_id: &str,
        reference: &str,
        values: &[String],
    ) -> Result<()> {
        let selector = ref_to_selector(reference);
        let selector_json = serde_json::to_string(&selector)?;
        let values_json = serde_json::to_string(values)?;
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({selector_json});
                if (!el || el.tagName !== 'SELECT') return false;
                const values = {values_json};
                for (const option of el.options) {{
                    option.selected = values.includes(option.value);
                }}
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#
        );

        let selected = eval_value(page, js)
            .await
            .map_err(|e| DriverError::for_action("select", target_id, e))?;
        if !selected.as_bool().unwrap_or(false) {
            return Err(DriverError::for_action(
                "select",
                target_id,
                format!("select element not found: {}", selector),
            ));
        }
        Ok(())
    }

    /// Wait for the first satisfied condition: text on the page, an element
    /// matching a reference, or a plain duration.
    async fn wait(&self, target_id: &str, action: &WaitAction) -> Result<()> {
        let timeout = Duration::from_millis(action.time_ms.unwrap_or(DEFAULT_WAIT_TIMEOUT_MS));

        if let Some(text) = action.text.as_deref() {
            let page = self.resolve(target_id).await?;
            let text_json = serde_json::to_string(text)?;
            let js =
                format!("document.body && document.body.innerText.includes({text_json})");
            return self.poll_until(&page, &js, timeout, || {
                format!("text '{}' not found within {:?} on target {}", text, timeout, target_id)
            })
            .await;
        }

        if let Some(reference) = action.reference.as_deref() {
            let page = self.resolve(target_id).await?;
            let selector = ref_to_selector(reference);
            let selector_json = serde_json::to_string(&selector)?;
            let js = format!("document.querySelector({selector_json}) !== null");
            return self.poll_until(&page, &js, timeout, || {
                format!(
                    "element '{}' not found within {:?} on target {}",
                    selector, timeout, target_id
                )
            })
            .await;
        }

        if let Some(ms) = action.time_ms {
            sleep(Duration::from_millis(ms)).await;
        }

        Ok(())
    }

    async fn poll_until(
        &self,
        page: &Page,
        js: &str,
        timeout: Duration,
        describe: impl Fn() -> String,
    ) -> Result<()> {
        let start = Instant::now();
        loop {
            let satisfied = eval_value(page, js.to_string())
                .await
                .map(|v| v.as_bool().unwrap_or(false))
                .unwrap_or(false);
            if satisfied {
                return Ok(());
            }
            if start.elapsed() > timeout {
                return Err(DriverError::Timeout(describe()));
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    async fn evaluate_on_handle(
        &self,
        page: &Page,
        target_id: &str,
        body: &str,
    ) -> Result<Value> {
        let result = if looks_like_function(body) {
            page.evaluate_function(body).await
        } else {
            page.evaluate(body).await
        };

        match result {
            Ok(evaluation) => Ok(evaluation.value().cloned().unwrap_or(Value::Null)),
            Err(e) => Err(DriverError::Eval {
                target: target_id.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn resize_raw(&self, target_id: &str, action: &ResizeAction) -> Result<()> {
        let ws_url = self.target_ws_url(target_id).await?;
        let (default_width, default_height) = DEFAULT_VIEWPORT;
        cdp::send(
            &ws_url,
            "Emulation.setDeviceMetricsOverride",
            serde_json::json!({
                "width": action.width.unwrap_or(default_width),
                "height": action.height.unwrap_or(default_height),
                "deviceScaleFactor": 1,
                "mobile": false,
            }),
        )
        .await
        .map_err(|e| DriverError::for_action("resize", target_id, e))?;
        Ok(())
    }

    async fn emulate_device(
        &self,
        page: &Page,
        target_id: &str,
        preset: &DevicePreset,
    ) -> Result<()> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(preset.width)
            .height(preset.height)
            .device_scale_factor(preset.device_scale_factor)
            .mobile(preset.mobile)
            .build()
            .map_err(|e| DriverError::for_action("device", target_id, e))?;
        page.execute(metrics)
            .await
            .map_err(|e| DriverError::for_action("device", target_id, e))?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(preset.user_agent)
            .build()
            .map_err(|e| DriverError::for_action("device", target_id, e))?;
        page.execute(user_agent)
            .await
            .map_err(|e| DriverError::for_action("device", target_id, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_click_descriptor_with_camel_case_fields() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "kind": "click",
            "ref": "42",
            "doubleClick": true,
            "modifiers": ["Shift"]
        }))
        .unwrap();

        match action {
            Action::Click(click) => {
                assert_eq!(click.reference.as_deref(), Some("42"));
                assert!(click.double_click);
                assert_eq!(click.modifiers, vec!["Shift".to_string()]);
            }
            other => panic!("expected click, got {}", other.kind()),
        }
    }

    #[test]
    fn parses_fill_descriptor_field_list() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "kind": "fill",
            "fields": [
                { "ref": "#name", "value": "Ada" },
                { "ref": "#email", "value": "ada@example.com" }
            ]
        }))
        .unwrap();

        match action {
            Action::Fill(fill) => {
                assert_eq!(fill.fields.len(), 2);
                assert_eq!(fill.fields[1].reference, "#email");
            }
            other => panic!("expected fill, got {}", other.kind()),
        }
    }

    #[test]
    fn parses_wait_descriptor_time_ms() {
        let action: Action =
            serde_json::from_value(serde_json::json!({ "kind": "wait", "timeMs": 1500 })).unwrap();

        match action {
            Action::Wait(wait) => assert_eq!(wait.time_ms, Some(1500)),
            other => panic!("expected wait, got {}", other.kind()),
        }
    }

    #[test]
    fn unknown_kind_parses_to_unknown_and_fails_validation() {
        let action: Action =
            serde_json::from_value(serde_json::json!({ "kind": "bogus" })).unwrap();
        assert_eq!(action.kind(), "bogus");

        let result = validate(&action, "T1");
        assert!(matches!(
            result,
            Err(DriverError::UnsupportedAction { kind, target })
                if kind == "bogus" && target == "T1"
        ));
    }

    #[test]
    fn click_without_ref_fails_missing_reference() {
        let action: Action = serde_json::from_value(serde_json::json!({ "kind": "click" })).unwrap();

        let result = validate(&action, "T1");
        assert!(matches!(
            result,
            Err(DriverError::MissingReference { kind, target })
                if kind == "click" && target == "T1"
        ));
    }

    #[test]
    fn drag_requires_both_endpoints() {
        let action: Action = serde_json::from_value(serde_json::json!({
            "kind": "drag",
            "startRef": "3"
        }))
        .unwrap();

        assert!(matches!(
            validate(&action, "T1"),
            Err(DriverError::MissingReference { kind, .. }) if kind == "drag"
        ));
    }

    #[test]
    fn press_without_key_passes_validation() {
        let action: Action = serde_json::from_value(serde_json::json!({ "kind": "press" })).unwrap();
        assert!(validate(&action, "T1").is_ok());
    }

    #[test]
    fn descriptor_without_kind_is_rejected() {
        let result: std::result::Result<Action, _> =
            serde_json::from_value(serde_json::json!({ "ref": "1" }));
        assert!(result.is_err());
    }

    #[test]
    fn numeric_reference_becomes_aria_ref_selector() {
        assert_eq!(ref_to_selector("17"), "[aria-ref=\"17\"]");
    }

    #[test]
    fn role_reference_becomes_ref_selector() {
        assert_eq!(ref_to_selector("e12"), "[ref=\"e12\"]");
    }

    #[test]
    fn css_selectors_pass_through_unchanged() {
        assert_eq!(ref_to_selector("#submit-button"), "#submit-button");
        // 'e'-prefixed words are not role references
        assert_eq!(ref_to_selector("em.price"), "em.price");
        assert_eq!(ref_to_selector("e"), "e");
    }

    #[test]
    fn modifier_mask_follows_cdp_bit_layout() {
        assert_eq!(modifiers_mask(&["Alt".to_string()]), 1);
        assert_eq!(modifiers_mask(&["Control".to_string()]), 2);
        assert_eq!(
            modifiers_mask(&["Shift".to_string(), "Meta".to_string()]),
            12
        );
        assert_eq!(modifiers_mask(&["bogus".to_string()]), 0);
    }

    #[test]
    fn function_bodies_are_distinguished_from_expressions() {
        assert!(looks_like_function("() => 1 + 1"));
        assert!(looks_like_function("function f() { return 2; }"));
        assert!(looks_like_function("async () => fetch('/x')"));
        assert!(!looks_like_function("document.title"));
        assert!(!looks_like_function("1 + 1"));
    }

    #[test]
    fn key_specs_cover_common_submit_keys() {
        let enter = key_spec("Enter").unwrap();
        assert_eq!(enter.vk, 13);
        assert_eq!(enter.text, "\r");

        let tab = key_spec("tab").unwrap();
        assert_eq!(tab.code, "Tab");

        assert!(key_spec("hyperdrive").is_none());
    }

    #[test]
    fn device_presets_resolve_ignoring_case_and_separators() {
        assert!(device_preset("iPhone 13").is_some());
        assert!(device_preset("pixel-7").is_some());
        let desktop = device_preset("desktop").unwrap();
        assert!(!desktop.mobile);
        assert!(device_preset("vic-20").is_none());
    }
}
