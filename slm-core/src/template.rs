//! Placeholder vocabulary for folder and file name templates
//!
//! Templates are stored verbatim in the settings; the organiser substitutes
//! them. Nothing here rejects a template, unknown `{...}` groups are simply
//! not reported by [`tokens_in`].

use std::fmt;
use std::str::FromStr;

/// A placeholder that may appear as `{NAME}` inside a naming template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplateToken {
    TitleId,
    TitleName,
    DlcName,
    Version,
    Region,
    VersionTxt,
    Type,
}

impl TemplateToken {
    pub const ALL: [TemplateToken; 7] = [
        TemplateToken::TitleId,
        TemplateToken::TitleName,
        TemplateToken::DlcName,
        TemplateToken::Version,
        TemplateToken::Region,
        TemplateToken::VersionTxt,
        TemplateToken::Type,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TemplateToken::TitleId => "TITLE_ID",
            TemplateToken::TitleName => "TITLE_NAME",
            TemplateToken::DlcName => "DLC_NAME",
            TemplateToken::Version => "VERSION",
            TemplateToken::Region => "REGION",
            TemplateToken::VersionTxt => "VERSION_TXT",
            TemplateToken::Type => "TYPE",
        }
    }

    /// Token wrapped in braces, as written in a template
    pub fn placeholder(self) -> String {
        format!("{{{}}}", self.name())
    }
}

impl fmt::Display for TemplateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TemplateToken {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim_start_matches('{').trim_end_matches('}');
        TemplateToken::ALL
            .into_iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| format!("unknown template token: {}", s))
    }
}

/// Known placeholders in `template`, in order of appearance
pub fn tokens_in(template: &str) -> Vec<TemplateToken> {
    let mut found = Vec::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        if let Ok(token) = after[..close].parse::<TemplateToken>() {
            found.push(token);
        }
        rest = &after[close + 1..];
    }

    found
}

/// Default folder template: the title name alone
pub fn default_folder_template() -> String {
    TemplateToken::TitleName.placeholder()
}

/// Default file template: `{TITLE_NAME} ({DLC_NAME})[{TITLE_ID}][v{VERSION}]`
pub fn default_file_template() -> String {
    format!(
        "{} ({})[{}][v{}]",
        TemplateToken::TitleName.placeholder(),
        TemplateToken::DlcName.placeholder(),
        TemplateToken::TitleId.placeholder(),
        TemplateToken::Version.placeholder(),
    )
}
