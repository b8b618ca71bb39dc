//! Label submission body and ZPL rendering.

use serde::{Deserialize, Serialize};

/// A single failed validation rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// Dotted path of the offending field.
    pub failed_field: String,
    /// Name of the rule that failed.
    pub tag: String,
    /// Rule parameter, empty for parameterless rules.
    pub value: String,
}

impl FieldError {
    pub fn new(failed_field: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            failed_field: failed_field.into(),
            tag: tag.into(),
            value: String::new(),
        }
    }
}

/// Collect a `notblank` failure for `value` under `field`.
pub fn require_not_blank(errors: &mut Vec<FieldError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "notblank"));
    }
}

/// A decoded label print request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRequest {
    #[serde(default)]
    pub human_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub printer_name: String,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub filament_type: String,
    #[serde(default)]
    pub filament_owner: String,
    #[serde(default)]
    pub filament_weight: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl LabelRequest {
    /// Check every required field. Returns all failures at once.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        let fields = [
            ("LabelRequest.humanName", &self.human_name),
            ("LabelRequest.email", &self.email),
            ("LabelRequest.printerName", &self.printer_name),
            ("LabelRequest.fileName", &self.file_name),
            ("LabelRequest.filamentType", &self.filament_type),
            ("LabelRequest.filamentOwner", &self.filament_owner),
            ("LabelRequest.filamentWeight", &self.filament_weight),
            ("LabelRequest.time", &self.time),
            ("LabelRequest.uuid", &self.uuid),
        ];
        for (field, value) in fields {
            require_not_blank(&mut errors, field, value);
        }
        if self.timestamp == 0 {
            errors.push(FieldError::new("LabelRequest.timestamp", "required"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render the three-section ZPL label.
    pub fn render_zpl(&self) -> String {
        let mut out = String::from("^XA");

        out.push_str("\n\n^FX First Section with person name and print name");
        push_field(&mut out, "Name:", (60, 50), (210, 60), &self.human_name);
        out.push('\n');
        push_field(&mut out, "Email:", (60, 120), (190, 130), &self.email);
        out.push('\n');
        push_field(&mut out, "File:", (60, 190), (190, 200), &self.file_name);
        out.push_str("\n\n^FO50,270^GB700,3,3^FS");

        out.push_str("\n\n\n^FX Second Section with plastic type");
        push_field(&mut out, "Filament:", (60, 320), (270, 330), &self.filament_type);
        out.push('\n');
        push_field(&mut out, "Type:", (60, 390), (190, 400), &self.filament_owner);
        out.push('\n');
        let weight = format!("{} g", self.filament_weight);
        push_field(&mut out, "Weight:", (60, 460), (230, 470), &weight);
        out.push_str("\n\n^FO50,540^GB1100,3,3^FS");

        out.push_str("\n\n\n^FX Third Section with printer, time and QR");
        push_field(&mut out, "Printer:", (60, 590), (230, 600), &self.printer_name);
        out.push_str("\n^CFD,40");
        out.push_str(&format!("\n^FO60,820^FD{}^FS", self.time));
        out.push_str("\n\n^FO850,50\n^BQN,2,8");
        out.push_str(&format!("\n^FDMA,{}^FS", self.uuid));

        out.push_str("\n\n^XZ");
        out
    }
}

fn push_field(out: &mut String, label: &str, label_at: (u32, u32), value_at: (u32, u32), value: &str) {
    out.push_str("\n^CF0,50");
    out.push_str(&format!("\n^FO{},{}^FD{}^FS", label_at.0, label_at.1, label));
    out.push_str("\n^CFD,40");
    out.push_str(&format!("\n^FO{},{}^FD{}^FS", value_at.0, value_at.1, value));
}
