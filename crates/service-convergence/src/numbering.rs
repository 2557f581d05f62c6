//! Instance number allocation.

use crate::{labels, Error, Result};
use container_runtime::ContainerSummary;

/// Instance number stored on a container's label
pub fn container_number(container: &ContainerSummary) -> Result<u32> {
    let value = container.label(labels::CONTAINER_NUMBER).unwrap_or_default();
    value
        .parse::<u32>()
        .map_err(|_| Error::InvalidContainerNumber {
            container: container.name.clone(),
            value: value.to_string(),
        })
}

/// One past the highest instance number in use, or 1 when there are none.
///
/// Every container must carry a valid number; a malformed label is an error
/// rather than something to skip. So is a highest number of `u32::MAX`.
pub fn next_container_number(containers: &[ContainerSummary]) -> Result<u32> {
    let mut highest: Option<(u32, &ContainerSummary)> = None;
    for container in containers {
        let number = container_number(container)?;
        if highest.is_none_or(|(max, _)| number > max) {
            highest = Some((number, container));
        }
    }
    match highest {
        None => Ok(1),
        Some((max, container)) => max.checked_add(1).ok_or_else(|| exhausted(container, max)),
    }
}

/// Consecutive instance numbers for `count` new containers
pub fn allocate_container_numbers(
    containers: &[ContainerSummary],
    count: usize,
) -> Result<Vec<u32>> {
    let next = next_container_number(containers)?;
    (0..count)
        .map(|offset| {
            u32::try_from(offset)
                .ok()
                .and_then(|offset| next.checked_add(offset))
                .ok_or_else(|| Error::InvalidContainerNumber {
                    container: format!("instance {} of {}", offset + 1, count),
                    value: format!("{} + {}", next, offset),
                })
        })
        .collect()
}

fn exhausted(container: &ContainerSummary, number: u32) -> Error {
    Error::InvalidContainerNumber {
        container: container.name.clone(),
        value: format!("{} (no instance number left above it)", number),
    }
}
