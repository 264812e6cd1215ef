//! Kismet netxml parsing
//!
//! Only `<SSID>` blocks typed `Probe Request` are read. Timestamps come from
//! the block's `first-time`/`last-time` attributes, falling back to those of
//! the enclosing `<wireless-client>` or `<wireless-network>`, which also
//! supplies the station identifier (`<client-mac>` or `<BSSID>`). Because a
//! network's `<BSSID>` follows its `<SSID>` blocks, records are emitted when
//! the enclosing element closes.

use log::{debug, warn};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{parse_optional_time, CaptureError, CaptureFilter};
use crate::data::ProbeRecord;

const PROBE_REQUEST_TYPE: &str = "probe request";

/// Raw timestamps as found in attributes
#[derive(Debug, Default, Clone)]
struct SeenTimes {
    first: Option<String>,
    last: Option<String>,
}

impl SeenTimes {
    fn from_element(element: &BytesStart) -> Self {
        let mut times = Self::default();
        for attr in element.attributes().flatten() {
            let value = attr.unescape_value().ok().map(|v| v.into_owned());
            match attr.key.as_ref() {
                b"first-time" => times.first = value,
                b"last-time" => times.last = value,
                _ => {}
            }
        }
        times
    }

    fn or(self, fallback: &SeenTimes) -> SeenTimes {
        SeenTimes {
            first: self.first.or_else(|| fallback.first.clone()),
            last: self.last.or_else(|| fallback.last.clone()),
        }
    }
}

/// An open `<SSID>` block
#[derive(Debug, Default)]
struct SsidBlock {
    kind: Option<String>,
    name: Option<String>,
    times: SeenTimes,
}

/// An open `<wireless-client>` or `<wireless-network>` element
#[derive(Debug, Default)]
struct Station {
    station_id: Option<String>,
    times: SeenTimes,
    probes: Vec<(String, SeenTimes)>,
}

fn is_station_element(name: &[u8]) -> bool {
    name == b"wireless-client" || name == b"wireless-network"
}

struct Collector<'f> {
    filter: &'f CaptureFilter,
    records: Vec<ProbeRecord>,
}

impl Collector<'_> {
    fn emit(&mut self, network_name: String, station_id: Option<String>, times: SeenTimes) {
        let parsed = parse_optional_time(times.first.as_deref())
            .and_then(|first| Ok((first, parse_optional_time(times.last.as_deref())?)));
        let (first_seen, last_seen) = match parsed {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Failed to parse time for {}: {}", network_name, e);
                return;
            }
        };

        let mut record = ProbeRecord::new(network_name).with_times(first_seen, last_seen);
        record.station_id = station_id;
        if self.filter.accepts(&record) {
            self.records.push(record);
        } else {
            debug!("Filtered out {}", record.network_name);
        }
    }

    fn flush(&mut self, station: Station) {
        for (network_name, times) in station.probes {
            self.emit(network_name, station.station_id.clone(), times);
        }
    }
}

/// Parses a netxml document, keeping probe requests accepted by `filter`
pub fn parse_netxml(xml: &str, filter: &CaptureFilter) -> Result<Vec<ProbeRecord>, CaptureError> {
    let mut reader = Reader::from_str(xml);
    let mut collector = Collector {
        filter,
        records: Vec::new(),
    };

    let mut open: Vec<Vec<u8>> = Vec::new();
    let mut stations: Vec<Station> = Vec::new();
    let mut ssid: Option<SsidBlock> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(element) => {
                let name = element.name().as_ref().to_vec();
                if is_station_element(&name) {
                    stations.push(Station {
                        times: SeenTimes::from_element(&element),
                        ..Default::default()
                    });
                } else if name == b"SSID" {
                    ssid = Some(SsidBlock {
                        times: SeenTimes::from_element(&element),
                        ..Default::default()
                    });
                }
                open.push(name);
                text.clear();
            }
            Event::Text(content) => text.push_str(&content.unescape()?),
            Event::CData(content) => text.push_str(&String::from_utf8_lossy(&content)),
            Event::End(_) => {
                let Some(name) = open.pop() else { continue };
                let value = text.trim().to_string();
                text.clear();

                match name.as_slice() {
                    b"type" => {
                        if let Some(block) = ssid.as_mut() {
                            block.kind = Some(value);
                        }
                    }
                    b"ssid" | b"essid" => {
                        if let Some(block) = ssid.as_mut() {
                            block.name = Some(value);
                        }
                    }
                    b"client-mac" | b"BSSID" => {
                        if let Some(station) = stations.last_mut() {
                            if station.station_id.is_none() && !value.is_empty() {
                                station.station_id = Some(value);
                            }
                        }
                    }
                    b"SSID" => {
                        let Some(block) = ssid.take() else { continue };
                        let is_probe = block
                            .kind
                            .as_deref()
                            .map(|kind| kind.eq_ignore_ascii_case(PROBE_REQUEST_TYPE))
                            .unwrap_or(false);
                        let network_name = block.name.unwrap_or_default();
                        if !is_probe || network_name.is_empty() {
                            continue;
                        }
                        match stations.last_mut() {
                            Some(station) => {
                                let times = block.times.or(&station.times);
                                station.probes.push((network_name, times));
                            }
                            None => collector.emit(network_name, None, block.times),
                        }
                    }
                    other if is_station_element(other) => {
                        if let Some(station) = stations.pop() {
                            collector.flush(station);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(unclosed) = open.last() {
        return Err(CaptureError::Truncated(String::from_utf8_lossy(unclosed).into_owned()));
    }

    Ok(collector.records)
}
