//! Heuristic field extraction for records the structured decoder could not
//! resolve. Scans the raw payload bytes for event id patterns and for
//! recognizable provider, channel and computer strings.

use std::sync::LazyLock;

use log::trace;
use regex::Regex;

/// Event ids that get an exact byte-pattern match before the generic
/// numeric scan runs. Security logon/logoff and service control ids show up
/// in the overwhelming majority of collected logs.
const KNOWN_EVENT_IDS: [u32; 11] = [
    4624, 4625, 4634, 4648, 4672, 4688, 1102, 7034, 7036, 7040, 7045,
];

const EVENT_ID_RANGE: std::ops::RangeInclusive<u32> = 1000..=5000;

/// Only the head of the payload is considered for the level scan; the
/// system header region sits there when the record is well formed.
const LEVEL_SCAN_WINDOW: usize = 512;

static PROVIDER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(Microsoft-Windows-[A-Za-z0-9 .-]+|Microsoft Antimalware|Service Control Manager|Windows Error Reporting|EventLog|PowerShell)$",
    )
    .expect("valid regex")
});

static CHANNEL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(Security|System|Application|Setup|ForwardedEvents|[A-Za-z0-9 .-]+/(Operational|Admin|Debug|Analytic))$")
        .expect("valid regex")
});

static COMPUTER_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(DESKTOP-[A-Z0-9]{4,}|WIN-[A-Z0-9]{4,}|[A-Za-z0-9][A-Za-z0-9-]*(\.[A-Za-z0-9-]+)+)$")
        .expect("valid regex")
});

#[derive(Debug, Default, PartialEq)]
pub(crate) struct FallbackFields {
    pub(crate) event_id: Option<u32>,
    pub(crate) level: Option<u8>,
    pub(crate) provider: Option<String>,
    pub(crate) channel: Option<String>,
    pub(crate) computer: Option<String>,
}

/// Scan `payload` for whatever identifying fields it still gives up.
///
/// `known_computer` memoizes the computer name across the records of one
/// parse job: once any record resolves it, later records that only carry it
/// in undecodable regions inherit it instead of degrading to unknown.
pub(crate) fn extract(payload: &[u8], known_computer: &mut Option<String>) -> FallbackFields {
    let mut fields = FallbackFields::default();

    if let Some((event_id, position)) = scan_event_id(payload) {
        fields.event_id = Some(event_id);
        fields.level = level_before_id(payload, position);
    }
    if fields.level.is_none() {
        fields.level = level_near_type_tag(payload);
    }

    scan_strings(payload, &mut fields);

    match (&fields.computer, &known_computer) {
        (Some(found), _) => *known_computer = Some(found.clone()),
        (None, Some(cached)) => fields.computer = Some(cached.clone()),
        (None, None) => {}
    }

    trace!(
        "heuristic pass found id {:?}, level {:?}, provider {:?}",
        fields.event_id,
        fields.level,
        fields.provider
    );

    fields
}

fn scan_event_id(payload: &[u8]) -> Option<(u32, usize)> {
    for id in KNOWN_EVENT_IDS {
        let needle = id.to_le_bytes();
        if let Some(position) = find(payload, &needle) {
            return Some((id, position));
        }
    }

    // 32-bit scan first: the trailing zero bytes make it far less likely to
    // fire on unrelated data than a bare 16-bit match.
    for (position, window) in payload.windows(4).enumerate() {
        let value = u32::from_le_bytes([window[0], window[1], window[2], window[3]]);
        if EVENT_ID_RANGE.contains(&value) {
            return Some((value, position));
        }
    }
    for (position, window) in payload.windows(2).enumerate() {
        let value = u32::from(u16::from_le_bytes([window[0], window[1]]));
        if EVENT_ID_RANGE.contains(&value) {
            return Some((value, position));
        }
    }

    None
}

/// In the common substitution spool layout the level byte sits four bytes
/// before the event id.
fn level_before_id(payload: &[u8], id_position: usize) -> Option<u8> {
    let candidate = *payload.get(id_position.checked_sub(4)?)?;
    (1..=5).contains(&candidate).then_some(candidate)
}

/// A small integer right after a `0x04` byte reads as a one-byte unsigned
/// value and its payload, which is how a level substitution is spooled.
fn level_near_type_tag(payload: &[u8]) -> Option<u8> {
    let window = &payload[..payload.len().min(LEVEL_SCAN_WINDOW)];
    window
        .windows(2)
        .find(|pair| pair[0] == 0x04 && (1..=5).contains(&pair[1]))
        .map(|pair| pair[1])
}

fn scan_strings(payload: &[u8], fields: &mut FallbackFields) {
    let mut candidates = Vec::new();
    collect_utf16_runs(payload, &mut candidates);
    collect_ascii_runs(payload, &mut candidates);

    for candidate in candidates {
        if fields.computer.is_none() && looks_like_computer(&candidate) {
            fields.computer = Some(candidate);
        } else if fields.provider.is_none() && PROVIDER_PATTERN.is_match(&candidate) {
            fields.provider = Some(candidate);
        } else if fields.channel.is_none() && CHANNEL_PATTERN.is_match(&candidate) {
            fields.channel = Some(candidate);
        }

        if fields.provider.is_some() && fields.channel.is_some() && fields.computer.is_some() {
            break;
        }
    }
}

fn looks_like_computer(candidate: &str) -> bool {
    COMPUTER_PATTERN.is_match(candidate)
        && candidate.chars().any(|c| c.is_ascii_alphabetic())
}

const MIN_RUN_CHARS: usize = 4;

/// Printable UTF-16LE runs, tried at both byte parities since corruption
/// can shift the string region off its natural alignment.
fn collect_utf16_runs(payload: &[u8], out: &mut Vec<String>) {
    for parity in 0..2usize {
        let mut run = String::new();
        let mut i = parity;

        while i + 1 < payload.len() {
            let unit = u16::from_le_bytes([payload[i], payload[i + 1]]);
            match char::from_u32(u32::from(unit)) {
                Some(c) if unit >= 0x20 && unit < 0x7f => run.push(c),
                _ => {
                    if run.len() >= MIN_RUN_CHARS {
                        out.push(std::mem::take(&mut run));
                    }
                    run.clear();
                }
            }
            i += 2;
        }
        if run.len() >= MIN_RUN_CHARS {
            out.push(run);
        }
    }
}

fn collect_ascii_runs(payload: &[u8], out: &mut Vec<String>) {
    let mut run = String::new();
    for &byte in payload {
        if (0x20..0x7f).contains(&byte) {
            run.push(byte as char);
        } else {
            if run.len() >= MIN_RUN_CHARS {
                out.push(std::mem::take(&mut run));
            }
            run.clear();
        }
    }
    if run.len() >= MIN_RUN_CHARS {
        out.push(run);
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
