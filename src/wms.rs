//! Extraction of grid dimensions from an ERDDAP WMS GetCapabilities document.
//!
//! ERDDAP publishes one top-level `Layer` per server and one nested `Layer`
//! per gridded variable. All variables of a dataset share the same axes, so
//! only the first nested layer is read.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::BrokerError;

/// Raw bounding-box attributes; any of them may be missing from the document.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawBoundingBox {
    pub min_x: Option<f64>,
    pub min_y: Option<f64>,
    pub max_x: Option<f64>,
    pub max_y: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridCapabilities {
    pub bounding_box: Option<RawBoundingBox>,
    pub time_values: Vec<String>,
    pub elevation_values: Vec<f64>,
}

#[derive(Clone, Copy, PartialEq)]
enum Dimension {
    Time,
    Elevation,
}

pub fn parse_capabilities(content: &[u8]) -> Result<GridCapabilities, BrokerError> {
    let mut reader = Reader::from_reader(content);
    reader.config_mut().trim_text(true);

    let mut capabilities = GridCapabilities::default();
    let mut buf = Vec::new();
    let mut layer_depth = 0usize;
    let mut current: Option<Dimension> = None;
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(element)) => match element.local_name().as_ref() {
                b"Layer" => layer_depth += 1,
                b"Dimension" if layer_depth >= 2 => {
                    current = dimension_kind(&element)?;
                    text.clear();
                }
                b"BoundingBox" if layer_depth >= 2 => {
                    read_bounding_box(&element, &mut capabilities)?;
                }
                _ => {}
            },
            Ok(Event::Empty(element)) => {
                if element.local_name().as_ref() == b"BoundingBox" && layer_depth >= 2 {
                    read_bounding_box(&element, &mut capabilities)?;
                }
            }
            Ok(Event::Text(content)) => {
                if current.is_some() {
                    let value = content
                        .unescape()
                        .map_err(|err| BrokerError::CapabilityParse(err.to_string()))?;
                    text.push_str(&value);
                }
            }
            Ok(Event::End(element)) => match element.local_name().as_ref() {
                b"Dimension" => {
                    if let Some(kind) = current.take() {
                        store_dimension(kind, &text, &mut capabilities)?;
                    }
                }
                b"Layer" => {
                    if layer_depth >= 2 {
                        break;
                    }
                    layer_depth = layer_depth.saturating_sub(1);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => return Err(BrokerError::CapabilityParse(err.to_string())),
        }
        buf.clear();
    }

    Ok(capabilities)
}

fn dimension_kind(element: &BytesStart<'_>) -> Result<Option<Dimension>, BrokerError> {
    let name = attribute(element, b"name")?;
    Ok(match name.as_deref() {
        Some("time") => Some(Dimension::Time),
        Some("elevation") => Some(Dimension::Elevation),
        _ => None,
    })
}

fn store_dimension(
    kind: Dimension,
    text: &str,
    capabilities: &mut GridCapabilities,
) -> Result<(), BrokerError> {
    let values = text
        .split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty());
    match kind {
        Dimension::Time => {
            capabilities.time_values = values.map(str::to_string).collect();
        }
        Dimension::Elevation => {
            capabilities.elevation_values = values
                .map(|value| {
                    value.parse::<f64>().map_err(|_| {
                        BrokerError::CapabilityParse(format!("invalid elevation value {value}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
        }
    }
    Ok(())
}

fn read_bounding_box(
    element: &BytesStart<'_>,
    capabilities: &mut GridCapabilities,
) -> Result<(), BrokerError> {
    if capabilities.bounding_box.is_some() {
        return Ok(());
    }
    capabilities.bounding_box = Some(RawBoundingBox {
        min_x: numeric_attribute(element, b"minx")?,
        min_y: numeric_attribute(element, b"miny")?,
        max_x: numeric_attribute(element, b"maxx")?,
        max_y: numeric_attribute(element, b"maxy")?,
    });
    Ok(())
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, BrokerError> {
    let attr = element
        .try_get_attribute(name)
        .map_err(|err| BrokerError::CapabilityParse(err.to_string()))?;
    attr.map(|attr| {
        attr.unescape_value()
            .map(|value| value.into_owned())
            .map_err(|err| BrokerError::CapabilityParse(err.to_string()))
    })
    .transpose()
}

fn numeric_attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<Option<f64>, BrokerError> {
    attribute(element, name)?
        .map(|value| {
            value.trim().parse::<f64>().map_err(|_| {
                BrokerError::CapabilityParse(format!("invalid bounding box value {value}"))
            })
        })
        .transpose()
}
