// Roster, snapshot and row models shared by both pipeline stages

use crate::error::{EtlError, EtlResult};
use chrono::{DateTime, TimeZone, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Display identifier of a player: `game_name#tag_line`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RiotId {
    pub game_name: String,
    pub tag_line: String,
}

impl FromStr for RiotId {
    type Err = EtlError;

    fn from_str(s: &str) -> EtlResult<Self> {
        let (name, tag) = s
            .split_once('#')
            .ok_or_else(|| EtlError::config(format!("riot id {s:?} is missing '#tag'")))?;
        if name.trim().is_empty() || tag.trim().is_empty() || tag.contains('#') {
            return Err(EtlError::config(format!("malformed riot id {s:?}")));
        }
        Ok(Self {
            game_name: name.to_string(),
            tag_line: tag.to_string(),
        })
    }
}

impl fmt::Display for RiotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.game_name, self.tag_line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterEntry {
    pub riot_id: RiotId,
    /// Provider-assigned opaque key (puuid), when configured statically.
    pub puuid: Option<String>,
}

/// Fixed, ordered list of tracked players.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statically configured key for a display id.
    pub fn puuid_for(&self, riot_id: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.riot_id.to_string() == riot_id)
            .and_then(|e| e.puuid.as_deref())
    }

    /// Parse `Name#Tag=puuid;Other#Tag=puuid`. The `=puuid` part is optional.
    pub fn parse_pairs(raw: &str) -> EtlResult<Self> {
        let mut entries = Vec::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (id, key) = match part.split_once('=') {
                Some((id, key)) => (id.trim(), Some(key.trim())),
                None => (part, None),
            };
            entries.push(RosterEntry {
                riot_id: id.parse()?,
                puuid: key.filter(|k| !k.is_empty()).map(str::to_string),
            });
        }
        Ok(Self::new(entries))
    }

    /// Parse either `{"Name#Tag": "puuid", ...}` or `["Name#Tag", ...]`.
    pub fn parse_json(raw: &str) -> EtlResult<Self> {
        let file: RosterFile = serde_json::from_str(raw)
            .map_err(|e| EtlError::config(format!("roster must be a JSON object or array: {e}")))?;
        let pairs: Vec<(String, Option<String>)> = match file {
            RosterFile::Keys(map) => map.into_iter().collect(),
            RosterFile::Ids(ids) => ids.into_iter().map(|id| (id, None)).collect(),
        };
        let entries = pairs
            .into_iter()
            .map(|(id, puuid)| {
                Ok(RosterEntry {
                    riot_id: id.parse()?,
                    puuid: puuid.filter(|k| !k.trim().is_empty()),
                })
            })
            .collect::<EtlResult<Vec<_>>>()?;
        Ok(Self::new(entries))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RosterFile {
    Keys(IndexMap<String, Option<String>>),
    Ids(Vec<String>),
}

/// One extraction run: player display id -> raw match documents, roster order.
pub type Snapshot = IndexMap<String, Vec<Value>>;

/// Blob name for a snapshot generated at `at`.
pub fn snapshot_blob_name(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}{}.json", prefix, at.format("%Y%m%d_%H%M%S"))
}

/// The subset of a match-detail document the loader reads.
#[derive(Debug, Clone, Deserialize)]
pub struct MatchDocument {
    pub metadata: MatchMetadata,
    pub info: MatchInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchMetadata {
    pub match_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchInfo {
    /// Milliseconds since the epoch
    pub game_creation: i64,
    /// Seconds
    pub game_duration: i64,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub puuid: String,
    pub champion_name: String,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub win: bool,
}

impl MatchDocument {
    pub fn participant(&self, puuid: &str) -> Option<&Participant> {
        self.info.participants.iter().find(|p| p.puuid == puuid)
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.info.game_creation).single()
    }
}

/// Warehouse-ready projection of one participant in one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatRow {
    pub player_riot_id: String,
    pub match_id: String,
    pub game_timestamp: DateTime<Utc>,
    pub champion: String,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub win: bool,
    pub game_duration: i64,
}

impl MatchStatRow {
    pub fn from_participant(
        player_riot_id: &str,
        doc: &MatchDocument,
        p: &Participant,
    ) -> Option<Self> {
        Some(Self {
            player_riot_id: player_riot_id.to_string(),
            match_id: doc.metadata.match_id.clone(),
            game_timestamp: doc.created_at()?,
            champion: p.champion_name.clone(),
            kills: p.kills,
            deaths: p.deaths,
            assists: p.assists,
            win: p.win,
            game_duration: doc.info.game_duration,
        })
    }
}
