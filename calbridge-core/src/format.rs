// ABOUTME: Markdown rendering of the weekly calendar summary shown by the view command
// ABOUTME: Events are grouped per calendar, then by day, with reply links or reply status

use std::collections::HashMap;

use crate::model::{Calendar, CalendarEvent, ParticipationStatus};
use crate::participation::{format_date, format_time, invitation_message};

pub const SUMMARY_HEADER: &str = "### Weekly Summary of Calendar Events\n\n";
const CALENDAR_SEPARATOR: &str = "\n\n-----\n\n";

/// Provider label used in calendar headings
fn provider_heading(provider: &str) -> &str {
    match provider {
        "google" => "Google",
        "live_connect" => "Microsoft Outlook",
        other => other,
    }
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Render one calendar's events, starting a day header whenever the date changes
pub fn event_list(participation_path: &str, events: &[&CalendarEvent]) -> String {
    let mut out = String::new();
    let mut current_day: Option<String> = None;

    for event in events {
        let start = event.start_time();
        let day = start.map(format_date).unwrap_or_default();
        if current_day.as_deref() != Some(day.as_str()) {
            out.push_str(&format!("\n##### {}\n\n", day));
            current_day = Some(day);
        }

        let mut bullets = Vec::new();
        if event.participation_status == ParticipationStatus::NeedsAction {
            bullets.push(invitation_message(participation_path, event));
        }

        let status = match event.participation_status {
            ParticipationStatus::Unknown | ParticipationStatus::NeedsAction => String::new(),
            other => {
                bullets.push(format!("You have replied: {}", title_case(other.as_str())));
                other.to_string()
            }
        };

        out.push_str(&format!(
            "* ##### {} - {} \"{}\" {}\n",
            start.map(format_time).unwrap_or_default(),
            event.end_time().map(format_time).unwrap_or_default(),
            event.summary,
            status
        ));
        for bullet in bullets {
            out.push_str(&format!("    * {}\n", bullet));
        }
    }
    out
}

/// Full weekly summary for the given calendars and their events.
///
/// Events whose calendar is not in `calendars` are left out. Calendars are
/// ordered by provider then name; events within a calendar by start time.
pub fn weekly_summary(
    participation_path: &str,
    calendars: &[Calendar],
    events: &[CalendarEvent],
) -> String {
    let mut grouped: HashMap<&str, Vec<&CalendarEvent>> = HashMap::new();
    for event in events {
        if calendars.iter().any(|c| c.calendar_id == event.calendar_id) {
            grouped
                .entry(event.calendar_id.as_str())
                .or_default()
                .push(event);
        } else {
            tracing::debug!(
                calendar_id = %event.calendar_id,
                event_uid = %event.event_uid,
                "Skipping event from unlisted calendar"
            );
        }
    }

    let mut sections: Vec<(&Calendar, Vec<&CalendarEvent>)> = calendars
        .iter()
        .filter_map(|c| grouped.remove(c.calendar_id.as_str()).map(|evts| (c, evts)))
        .collect();
    sections.sort_by(|(a, _), (b, _)| {
        a.provider_name
            .cmp(&b.provider_name)
            .then_with(|| a.calendar_name.cmp(&b.calendar_name))
    });

    let rendered: Vec<String> = sections
        .into_iter()
        .map(|(calendar, mut evts)| {
            evts.sort_by_key(|e| e.start_time());
            format!(
                "### {} \"{}\"\n{}",
                provider_heading(&calendar.provider_name),
                calendar.calendar_name,
                event_list(participation_path, &evts)
            )
        })
        .collect();

    format!("{}{}", SUMMARY_HEADER, rendered.join(CALENDAR_SEPARATOR))
}
