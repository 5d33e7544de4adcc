//! Markdown status messages.
//!
//! Times use Discord timestamp markup so the text only changes when the
//! payload does; the client renders the local time and the countdown.

use arbinquer_core::error::{ArbinquerError, Result};
use arbinquer_core::traits::Renderer;
use arbinquer_core::types::{FeedId, Snapshot};
use std::time::Duration;

use crate::arbitration::ArbitrationStatus;
use crate::cycles::CyclesStatus;
use crate::incursions::IncursionsStatus;
use crate::invasions::{InvasionSide, InvasionsStatus};
use crate::text::format_duration;

const SEPARATOR: &str = "------------------------------";
const FOOTER: &str = "Thanks to https://browse.wf/about for their great work.";

/// Room left for the reconciler's marker line under Discord's 2000 limit.
pub const MAX_MESSAGE_CHARS: usize = 1900;

pub struct FeedRenderer {
    invasions_interval: Duration,
}

impl FeedRenderer {
    pub fn new(invasions_interval: Duration) -> Self {
        Self { invasions_interval }
    }
}

impl Default for FeedRenderer {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl Renderer for FeedRenderer {
    fn render(&self, snapshot: &Snapshot) -> Result<String> {
        let message = match snapshot.feed_id {
            FeedId::Arbitration => arbitration(&snapshot.payload_as()?),
            FeedId::Incursions => incursions(&snapshot.payload_as()?),
            FeedId::Invasions => invasions(&snapshot.payload_as()?, self.invasions_interval),
            FeedId::Cycles => cycles(&snapshot.payload_as()?, snapshot),
        };
        let text = message.finish();
        if text.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ArbinquerError::render(format!(
                "{} message too long even after truncation",
                snapshot.feed_id
            )));
        }
        Ok(text)
    }
}

/// Header and footer lines are always kept; body rows are dropped from the
/// end to fit, replaced by a count.
struct Message {
    head: Vec<String>,
    rows: Vec<String>,
    tail: Vec<String>,
}

impl Message {
    fn new(emoji: &str, title: &str) -> Self {
        Self {
            head: vec![format!("# {emoji} {title}"), SEPARATOR.to_string()],
            rows: Vec::new(),
            tail: Vec::new(),
        }
    }

    fn finish(mut self) -> String {
        self.tail.push(SEPARATOR.to_string());
        self.tail.push(FOOTER.to_string());

        let fixed: usize = self.head.iter().chain(&self.tail).map(|l| l.chars().count() + 1).sum();
        let mut budget = MAX_MESSAGE_CHARS.saturating_sub(fixed);
        let total = self.rows.len();
        let mut kept = Vec::with_capacity(total);
        for (i, row) in self.rows.into_iter().enumerate() {
            let cost = row.chars().count() + 1;
            let remaining = total - i - 1;
            // Keep room for the "and N more" line unless this is the last row.
            let reserve = if remaining > 0 { 24 } else { 0 };
            if cost + reserve > budget {
                kept.push(format!("…and {} more", total - i));
                break;
            }
            budget -= cost;
            kept.push(row);
        }

        let mut lines = self.head;
        lines.extend(kept);
        lines.extend(self.tail);
        lines.join("\n")
    }
}

fn timestamp(ts: i64) -> String {
    format!("<t:{ts}:f> (<t:{ts}:R>)")
}

fn arbitration(status: &ArbitrationStatus) -> Message {
    let mut msg = Message::new("⚔️", "Arbitration");
    msg.rows.push(format!("- 📍 Location: {}", status.location));
    if let Some(mission) = &status.mission {
        msg.rows.push(format!("- 🧭 Mission: {mission}"));
    }
    msg.rows.push(format!("- ⏱ Start: {}", timestamp(status.start_ts)));
    msg.rows.push(format!("- 🔄 Next change: <t:{}:R>", status.ends_ts()));
    msg
}

fn incursions(status: &IncursionsStatus) -> Message {
    let mut msg = Message::new("🛡️", "Steel Path Incursions");
    msg.head.push("- 📍 Location: Multiple nodes".into());
    msg.head.push(format!("- ⏱ Start: {}", timestamp(status.start_ts)));
    msg.head.push(format!("- 🔄 Next change: <t:{}:R>", status.ends_ts()));
    msg.head.push("- 🧭 Incursions:".into());
    msg.rows.extend(status.nodes.iter().map(|node| format!("  - {node}")));
    msg
}

fn invasion_side(side: &InvasionSide) -> String {
    let mut text = format!("***{}***: {}", side.faction, side.missions.join(" / "));
    if !side.rewards.is_empty() {
        text.push_str(" · ");
        text.push_str(&side.rewards.join(", "));
    }
    text
}

fn invasions(status: &InvasionsStatus, interval: Duration) -> Message {
    let mut msg = Message::new("⚠️", "Invasions");
    if status.invasions.is_empty() {
        msg.rows.push("- No active invasions".into());
    }
    for invasion in &status.invasions {
        let sides: Vec<String> = invasion.sides.iter().map(invasion_side).collect();
        msg.rows.push(format!("**🛰️ {}** · {}", invasion.location, sides.join(" | ")));
    }
    msg.tail.push(format!("- 🔄 Next check: {}", format_duration(interval)));
    msg
}

fn cycles(status: &CyclesStatus, snapshot: &Snapshot) -> Message {
    let mut msg = Message::new("🌐", "Open World Cycles");
    for cycle in &status.cycles {
        msg.rows.push(match cycle.expiry_ts {
            Some(ts) => format!("- **{}**: {} (<t:{ts}:R>)", cycle.name, cycle.state),
            None => format!("- **{}**: {}", cycle.name, cycle.state),
        });
    }
    if let Some(next) = snapshot.next_boundary_at {
        msg.tail.push(format!("- 🔄 Next change: <t:{}:R>", next.timestamp()));
    }
    msg
}
