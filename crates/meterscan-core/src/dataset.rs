//! Cleaned, immutable dataset shared read-only by every detector.
//!
//! Building membership is indexed once per dataset so the peer detector
//! looks siblings up instead of re-scanning the table for every facility.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata of one monthly reading column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingColumn {
    pub label: String,
    pub year: i32,
    /// Calendar month when the label carries one (`2016/1`, `01.2016`, ...).
    pub month: Option<u32>,
}

impl ReadingColumn {
    /// First day of the labelled month, if the label names a month.
    pub fn period(&self) -> Option<NaiveDate> {
        self.month
            .and_then(|m| NaiveDate::from_ymd_opt(self.year, m, 1))
    }
}

/// One metering point with its chronological monthly readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub meter_id: String,
    pub building_id: String,
    pub readings: Vec<f64>,
}

impl Facility {
    pub fn new(meter_id: impl Into<String>, building_id: impl Into<String>, readings: Vec<f64>) -> Self {
        Self {
            meter_id: meter_id.into(),
            building_id: building_id.into(),
            readings,
        }
    }
}

/// Building id -> indices of member facilities, in dataset order.
#[derive(Debug, Clone, Default)]
pub struct BuildingIndex {
    members: HashMap<String, Vec<usize>>,
}

impl BuildingIndex {
    pub fn build(facilities: &[Facility]) -> Self {
        let mut members: HashMap<String, Vec<usize>> = HashMap::new();
        for (idx, facility) in facilities.iter().enumerate() {
            // A blank building id groups nothing.
            if facility.building_id.is_empty() {
                continue;
            }
            members
                .entry(facility.building_id.clone())
                .or_default()
                .push(idx);
        }
        Self { members }
    }

    pub fn members(&self, building_id: &str) -> &[usize] {
        self.members
            .get(building_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn building_count(&self) -> usize {
        self.members.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<ReadingColumn>,
    facilities: Vec<Facility>,
    buildings: BuildingIndex,
}

impl Dataset {
    pub fn new(columns: Vec<ReadingColumn>, facilities: Vec<Facility>) -> Self {
        let buildings = BuildingIndex::build(&facilities);
        Self {
            columns,
            facilities,
            buildings,
        }
    }

    /// Dataset without column metadata, mostly for tests and generators.
    pub fn from_facilities(facilities: Vec<Facility>) -> Self {
        Self::new(Vec::new(), facilities)
    }

    pub fn columns(&self) -> &[ReadingColumn] {
        &self.columns
    }

    pub fn facilities(&self) -> &[Facility] {
        &self.facilities
    }

    pub fn facility(&self, idx: usize) -> Option<&Facility> {
        self.facilities.get(idx)
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    /// Every row carrying `meter_id`, in dataset order.
    pub fn indices_of(&self, meter_id: &str) -> Vec<usize> {
        self.facilities
            .iter()
            .enumerate()
            .filter(|(_, f)| f.meter_id == meter_id)
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn buildings(&self) -> &BuildingIndex {
        &self.buildings
    }

    /// Facilities sharing the subject's building, excluding every row that
    /// carries the subject's meter id.
    pub fn peers_of(&self, idx: usize) -> impl Iterator<Item = &Facility> + '_ {
        let subject = self.facilities.get(idx);
        let members = subject
            .map(|f| self.buildings.members(&f.building_id))
            .unwrap_or(&[]);
        members.iter().filter_map(move |&peer_idx| {
            let peer = &self.facilities[peer_idx];
            match subject {
                Some(s) if peer.meter_id != s.meter_id => Some(peer),
                _ => None,
            }
        })
    }

    /// Stable fingerprint of the cleaned content.
    pub fn checksum(&self) -> u64 {
        let mut hasher = xxhash_rust::xxh3::Xxh3::new();
        for column in &self.columns {
            hasher.update(&(column.label.len() as u64).to_le_bytes());
            hasher.update(column.label.as_bytes());
        }
        for facility in &self.facilities {
            for id in [&facility.meter_id, &facility.building_id] {
                hasher.update(&(id.len() as u64).to_le_bytes());
                hasher.update(id.as_bytes());
            }
            hasher.update(&(facility.readings.len() as u64).to_le_bytes());
            for value in &facility.readings {
                hasher.update(&value.to_le_bytes());
            }
        }
        hasher.digest()
    }
}
