use crate::models::enums::SectionName;
use crate::models::SectionMap;

use super::PipelineError;

/// Content recorded for a section whose marker the response omitted.
pub fn placeholder_for(section: SectionName) -> String {
    format!("[{} content not generated]", section.as_str())
}

/// Split a generation response into the six canonical sections.
///
/// Each section runs from just after its `===NAME===` marker to the nearest
/// following canonical marker, or to the end of the text. Only the first
/// occurrence of a marker counts. A missing marker yields the placeholder, so
/// the map always has six entries; anything else is a `Parse` error.
pub fn parse_sections(response: &str) -> Result<SectionMap, PipelineError> {
    let markers: Vec<(SectionName, String)> = SectionName::ALL
        .iter()
        .map(|name| (*name, name.marker()))
        .collect();

    let positions: Vec<(SectionName, Option<usize>)> = markers
        .iter()
        .map(|(name, marker)| (*name, response.find(marker.as_str())))
        .collect();

    let mut sections = SectionMap::new();
    let mut missing = 0usize;

    for ((name, marker), (_, position)) in markers.iter().zip(&positions) {
        let content = match position {
            Some(start) => {
                let body_start = start + marker.len();
                let body_end = positions
                    .iter()
                    .filter_map(|(_, p)| *p)
                    .filter(|p| *p >= body_start)
                    .min()
                    .unwrap_or(response.len());
                response[body_start..body_end].trim().to_string()
            }
            None => {
                missing += 1;
                placeholder_for(*name)
            }
        };

        if sections.insert(*name, content).is_some() {
            return Err(PipelineError::Parse(format!(
                "section {} produced twice",
                name.as_str()
            )));
        }
    }

    if sections.len() != SectionName::ALL.len() {
        return Err(PipelineError::Parse(format!(
            "expected {} sections, got {}",
            SectionName::ALL.len(),
            sections.len()
        )));
    }

    if missing > 0 {
        tracing::warn!(missing, "Generation response omitted section markers");
    }

    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_response() -> String {
        "Here is the plan.\n\
         ===MEDICATIONS===\nTake aspirin.\n\n\
         ===WARNING SIGNS===\nCall 911 for face drooping.\n\
         ===MOBILITY===\nUse a walker.\n\
         ===DIET===\nSoft foods.\n\
         ===FOLLOW-UPS===\nNeurology in 1 week.\n\
         ===TEACH-BACK===\nWhat will you do if your arm feels weak?\n"
            .to_string()
    }

    #[test]
    fn all_markers_yield_exact_trimmed_content() {
        let sections = parse_sections(&full_response()).unwrap();
        assert_eq!(sections.len(), 6);
        assert_eq!(sections.get(SectionName::Medications), Some("Take aspirin."));
        assert_eq!(sections.get(SectionName::WarningSigns), Some("Call 911 for face drooping."));
        assert_eq!(sections.get(SectionName::Diet), Some("Soft foods."));
        assert_eq!(
            sections.get(SectionName::TeachBack),
            Some("What will you do if your arm feels weak?")
        );
    }

    #[test]
    fn missing_markers_get_placeholders() {
        let response = "===MEDICATIONS===\nTake aspirin.\n===DIET===\nSoft foods.";
        let sections = parse_sections(response).unwrap();
        assert_eq!(sections.len(), 6);
        assert_eq!(sections.get(SectionName::Medications), Some("Take aspirin."));
        assert_eq!(sections.get(SectionName::Diet), Some("Soft foods."));
        assert_eq!(
            sections.get(SectionName::Mobility),
            Some("[Mobility content not generated]")
        );
        assert_eq!(
            sections.get(SectionName::FollowUps),
            Some("[Follow-Ups content not generated]")
        );
    }

    #[test]
    fn empty_response_is_all_placeholders() {
        let sections = parse_sections("").unwrap();
        assert_eq!(sections.len(), 6);
        assert_eq!(sections.completed_count(), 0);
    }

    #[test]
    fn out_of_order_markers_do_not_bleed_into_each_other() {
        let response = "===DIET===\nSoft foods.\n===MEDICATIONS===\nTake aspirin.";
        let sections = parse_sections(response).unwrap();
        assert_eq!(sections.get(SectionName::Diet), Some("Soft foods."));
        assert_eq!(sections.get(SectionName::Medications), Some("Take aspirin."));
    }

    #[test]
    fn skipped_middle_marker_ends_at_next_present_one() {
        let response = "===MEDICATIONS===\nA\n===MOBILITY===\nB";
        let sections = parse_sections(response).unwrap();
        assert_eq!(sections.get(SectionName::Medications), Some("A"));
        assert_eq!(sections.get(SectionName::Mobility), Some("B"));
        assert_eq!(
            sections.get(SectionName::WarningSigns),
            Some("[Warning Signs content not generated]")
        );
    }

    #[test]
    fn marker_with_empty_body_is_empty_string() {
        let response = "===MEDICATIONS======WARNING SIGNS===\nCall 911.";
        let sections = parse_sections(response).unwrap();
        assert_eq!(sections.get(SectionName::Medications), Some(""));
        assert_eq!(sections.get(SectionName::WarningSigns), Some("Call 911."));
    }
}
