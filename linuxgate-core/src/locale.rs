//! Locale, keyboard and timezone values written for the Linux installer.
//!
//! Languages map to a Linux locale, a console/X11 keyboard layout and a
//! fallback timezone. The Windows timezone, when it can be read and mapped,
//! takes precedence over the language's fallback.

use crate::plan::LocaleSelection;
use linuxgate_hal::ProcessOps;
use std::time::Duration;

/// Defaults for one supported interface language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageDefaults {
    /// Two-letter language code (e.g. "fr")
    pub code: &'static str,
    /// Linux locale (e.g. "fr_FR.UTF-8")
    pub locale: &'static str,
    /// Keyboard layout (e.g. "fr")
    pub keyboard: &'static str,
    /// Timezone used when the Windows one cannot be mapped
    pub timezone: &'static str,
}

/// Available languages; the first entry is the fallback.
pub static LANGUAGES: &[LanguageDefaults] = &[
    LanguageDefaults {
        code: "en",
        locale: "en_US.UTF-8",
        keyboard: "us",
        timezone: "America/New_York",
    },
    LanguageDefaults {
        code: "fr",
        locale: "fr_FR.UTF-8",
        keyboard: "fr",
        timezone: "Europe/Paris",
    },
    LanguageDefaults {
        code: "es",
        locale: "es_ES.UTF-8",
        keyboard: "es",
        timezone: "Europe/Madrid",
    },
    LanguageDefaults {
        code: "ja",
        locale: "ja_JP.UTF-8",
        keyboard: "jp",
        timezone: "Asia/Tokyo",
    },
];

/// Windows timezone ids and their IANA equivalents.
pub static WINDOWS_TIMEZONES: &[(&str, &str)] = &[
    // Europe
    ("Romance Standard Time", "Europe/Paris"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Central European Standard Time", "Europe/Budapest"),
    ("GMT Standard Time", "Europe/London"),
    ("Central Europe Standard Time", "Europe/Prague"),
    ("E. Europe Standard Time", "Europe/Bucharest"),
    ("Russian Standard Time", "Europe/Moscow"),
    // Americas
    ("Eastern Standard Time", "America/New_York"),
    ("Central Standard Time", "America/Chicago"),
    ("Mountain Standard Time", "America/Denver"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("Atlantic Standard Time", "America/Halifax"),
    ("US Eastern Standard Time", "America/Indianapolis"),
    ("SA Pacific Standard Time", "America/Bogota"),
    ("SA Eastern Standard Time", "America/Buenos_Aires"),
    ("E. South America Standard Time", "America/Sao_Paulo"),
    ("Central Standard Time (Mexico)", "America/Mexico_City"),
    // Asia
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("China Standard Time", "Asia/Shanghai"),
    ("Korea Standard Time", "Asia/Seoul"),
    ("Singapore Standard Time", "Asia/Singapore"),
    ("India Standard Time", "Asia/Kolkata"),
    ("SE Asia Standard Time", "Asia/Bangkok"),
    ("Arabian Standard Time", "Asia/Dubai"),
    // Oceania
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("New Zealand Standard Time", "Pacific/Auckland"),
    // UTC
    ("UTC", "UTC"),
    ("Coordinated Universal Time", "UTC"),
];

/// Defaults for `code`, falling back to English for unsupported languages.
pub fn language(code: &str) -> &'static LanguageDefaults {
    let code = code.trim();
    LANGUAGES
        .iter()
        .find(|l| l.code.eq_ignore_ascii_case(code))
        .unwrap_or(&LANGUAGES[0])
}

pub fn windows_to_iana(windows_id: &str) -> Option<&'static str> {
    let id = windows_id.trim();
    WINDOWS_TIMEZONES
        .iter()
        .find(|(win, _)| win.eq_ignore_ascii_case(id))
        .map(|(_, iana)| *iana)
}

/// Read the current Windows timezone id with `tzutil /g`.
pub fn detect_windows_timezone<H: ProcessOps + ?Sized>(
    hal: &H,
    tzutil: &str,
    timeout: Duration,
) -> Option<String> {
    match hal.command_output(tzutil, &["/g"], timeout) {
        Ok(out) if out.status.success() => {
            let id = String::from_utf8_lossy(&out.stdout).trim().to_string();
            (!id.is_empty()).then_some(id)
        }
        Ok(out) => {
            log::warn!("tzutil exited with {:?}", out.status.code());
            None
        }
        Err(err) => {
            log::warn!("could not read the Windows timezone: {}", err);
            None
        }
    }
}

/// Locale values for `language_code`, with the timezone taken from
/// `windows_timezone` when it maps to an IANA zone.
pub fn selection_for(language_code: &str, windows_timezone: Option<&str>) -> LocaleSelection {
    let lang = language(language_code);
    let timezone = windows_timezone
        .and_then(windows_to_iana)
        .unwrap_or(lang.timezone);
    LocaleSelection {
        system_locale: lang.locale.to_string(),
        keyboard_layout: lang.keyboard.to_string(),
        timezone: timezone.to_string(),
    }
}
