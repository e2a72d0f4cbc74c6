//! Device reconciliation.
//!
//! Fresh terminal lists from the vendor are merged into the stored device
//! list by device id. The merge is a union: a terminal that drops out of the
//! vendor list keeps its record (and its company assignment) until it comes
//! back.

use std::collections::HashMap;

use crate::store::Device;

/// Merge freshly fetched devices into the stored list.
///
/// Stored order is preserved and unseen devices are appended. For a device
/// present on both sides, non-null remote fields win, but a stored
/// `company_id` is never cleared by a remote record that lacks one.
pub fn merge(remote: Vec<Device>, stored: &[Device]) -> Vec<Device> {
    let mut merged = dedupe(stored.to_vec());
    let mut index: HashMap<String, usize> = merged
        .iter()
        .enumerate()
        .map(|(i, d)| (d.id.clone(), i))
        .collect();

    for mut device in remote {
        device.id = normalize_id(&device.id);
        match index.get(&device.id) {
            Some(&i) => absorb(&mut merged[i], device),
            None => {
                index.insert(device.id.clone(), merged.len());
                merged.push(device);
            }
        }
    }

    merged
}

/// Collapse duplicate ids, keeping the first position and letting later
/// non-null fields overwrite earlier ones.
pub fn dedupe(devices: Vec<Device>) -> Vec<Device> {
    let mut out: Vec<Device> = Vec::with_capacity(devices.len());
    let mut index: HashMap<String, usize> = HashMap::new();

    for mut device in devices {
        device.id = normalize_id(&device.id);
        match index.get(&device.id) {
            Some(&i) => absorb(&mut out[i], device),
            None => {
                index.insert(device.id.clone(), out.len());
                out.push(device);
            }
        }
    }

    out
}

/// Set the company id of a device, inserting a minimal record if the id is
/// unknown. Applying the same update twice leaves the list unchanged.
pub fn update_company_id(devices: &mut Vec<Device>, device_id: &str, company_id: Option<String>) {
    let id = normalize_id(device_id);
    match devices.iter_mut().find(|d| normalize_id(&d.id) == id) {
        Some(device) => device.company_id = company_id,
        None => {
            let mut device = Device::new(id);
            device.company_id = company_id;
            devices.push(device);
        }
    }
}

/// Look up the company id assigned to a device.
pub fn company_id_of<'a>(devices: &'a [Device], device_id: &str) -> Option<&'a str> {
    let id = normalize_id(device_id);
    devices
        .iter()
        .find(|d| d.id == id)
        .and_then(|d| d.company_id.as_deref())
}

fn normalize_id(id: &str) -> String {
    id.trim().to_string()
}

fn absorb(target: &mut Device, incoming: Device) {
    fn take<T>(slot: &mut Option<T>, value: Option<T>) {
        if value.is_some() {
            *slot = value;
        }
    }

    take(&mut target.serial_number, incoming.serial_number);
    take(&mut target.name, incoming.name);
    take(&mut target.ip_address, incoming.ip_address);
    take(&mut target.company_id, incoming.company_id);
    take(&mut target.last_seen, incoming.last_seen);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn remote(id: &str, ip: &str) -> Device {
        Device {
            id: id.to_string(),
            serial_number: Some(format!("SN{id}")),
            name: Some(format!("Gate {id}")),
            ip_address: Some(ip.to_string()),
            company_id: None,
            last_seen: Some(Utc::now()),
        }
    }

    fn assigned(id: &str, company: &str) -> Device {
        let mut d = Device::new(id);
        d.company_id = Some(company.to_string());
        d
    }

    #[test]
    fn merge_keeps_company_id() {
        let stored = vec![assigned("1", "ACME")];
        let merged = merge(vec![remote("1", "10.0.0.1")], &stored);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].company_id.as_deref(), Some("ACME"));
        assert_eq!(merged[0].ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(merged[0].serial_number.as_deref(), Some("SN1"));
    }

    #[test]
    fn merge_survives_ip_change() {
        let mut stored = remote("7", "10.0.0.7");
        stored.company_id = Some("42".into());
        let merged = merge(vec![remote("7", "10.0.0.99")], &[stored]);

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].ip_address.as_deref(), Some("10.0.0.99"));
        assert_eq!(merged[0].company_id.as_deref(), Some("42"));
    }

    #[test]
    fn merge_is_a_union() {
        let stored = vec![assigned("1", "A"), assigned("2", "B")];
        let merged = merge(vec![remote("2", "10.0.0.2"), remote("3", "10.0.0.3")], &stored);

        let ids: Vec<&str> = merged.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);
        assert_eq!(merged[0].company_id.as_deref(), Some("A"));
        assert_eq!(merged[1].company_id.as_deref(), Some("B"));
        assert_eq!(merged[2].company_id, None);
    }

    #[test]
    fn merge_never_duplicates() {
        let merged = merge(vec![remote("5", "a"), remote(" 5", "b")], &[]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].ip_address.as_deref(), Some("b"));

        let again = merge(vec![remote("5", "c")], &merged);
        assert_eq!(again.len(), 1);
    }

    #[test]
    fn company_id_is_never_cleared_by_any_remote_record() {
        for company in ["0", "ACME", "  "] {
            let stored = vec![assigned("9", company)];
            for incoming in [remote("9", "x"), Device::new("9"), Device::new(" 9 ")] {
                let merged = merge(vec![incoming], &stored);
                assert_eq!(merged[0].company_id.as_deref(), Some(company));
            }
        }
    }

    #[test]
    fn dedupe_prefers_later_non_null_fields() {
        let first = assigned("3", "OLD");
        let mut second = remote("3", "10.0.0.3");
        second.company_id = None;
        let third = assigned("3", "NEW");

        let out = dedupe(vec![first, second, third]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].company_id.as_deref(), Some("NEW"));
        assert_eq!(out[0].ip_address.as_deref(), Some("10.0.0.3"));
    }

    #[test]
    fn update_company_id_is_idempotent() {
        let mut once = vec![remote("1", "a")];
        update_company_id(&mut once, "1", Some("X".into()));
        update_company_id(&mut once, "2", Some("Y".into()));

        let mut twice = once.clone();
        update_company_id(&mut twice, "1", Some("X".into()));
        update_company_id(&mut twice, "2", Some("Y".into()));

        assert_eq!(once, twice);
        assert_eq!(once.len(), 2);
        assert_eq!(company_id_of(&once, "2"), Some("Y"));
        assert_eq!(once[1].serial_number, None);
    }

    #[test]
    fn update_company_id_matches_string_normalized_ids() {
        let mut devices = vec![Device::new("12")];
        update_company_id(&mut devices, " 12 ", Some("Z".into()));
        assert_eq!(devices.len(), 1);
        assert_eq!(company_id_of(&devices, "12"), Some("Z"));
    }
}
