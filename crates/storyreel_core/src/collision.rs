use crate::types::*;
use uuid::Uuid;

/// Ripple after the clip `changed_id` grew.
///
/// Later clips on the same track (start >= the changed clip's start) are
/// visited in start order and pushed forward by exactly their overlap with
/// the running end. The walk stops at the first clip that does not overlap:
/// shifts only ever increase positions, so everything after it is clear too.
/// Earlier clips are never touched. Returns how many clips moved.
pub fn ripple_growth(clips: &mut [Clip], changed_id: Uuid) -> usize {
    let Some(changed) = clips.iter().find(|c| c.id == changed_id) else {
        return 0;
    };
    let track = changed.track;
    let start = changed.start_us;
    let mut cursor_end = changed.end_us();

    let mut candidates: Vec<usize> = clips
        .iter()
        .enumerate()
        .filter(|(_, c)| c.track == track && c.id != changed_id && c.start_us >= start)
        .map(|(i, _)| i)
        .collect();
    candidates.sort_by_key(|&i| clips[i].start_us);

    let mut shifted = 0;
    for idx in candidates {
        let candidate = &mut clips[idx];
        if cursor_end <= candidate.start_us {
            break;
        }
        let overlap = cursor_end - candidate.start_us;
        candidate.start_us = candidate.start_us + overlap;
        cursor_end = candidate.end_us();
        shifted += 1;
        tracing::trace!(clip = %candidate.id, by_us = overlap.0, "ripple shift");
    }
    shifted
}

/// Ripple after the clip `moved_id` got a new start.
///
/// The track is ordered by start time, except that the moved clip goes ahead
/// of any clip whose start is within `epsilon` of its own, so a drop onto a
/// neighbour reorders past it. One left-to-right pass then pushes each clip
/// that overlaps its predecessor to the predecessor's end. Earlier pairs are
/// not revisited. Returns how many clips moved.
pub fn ripple_move(clips: &mut [Clip], moved_id: Uuid, epsilon: TimeUs) -> usize {
    let Some(moved_idx) = clips.iter().position(|c| c.id == moved_id) else {
        return 0;
    };
    let track = clips[moved_idx].track;
    let moved_start = clips[moved_idx].start_us;

    let mut order: Vec<usize> = clips
        .iter()
        .enumerate()
        .filter(|(_, c)| c.track == track && c.id != moved_id)
        .map(|(i, _)| i)
        .collect();
    order.sort_by_key(|&i| clips[i].start_us);

    // Everything that starts at least `epsilon` before the moved clip stays ahead of it.
    let insert_at = order.partition_point(|&i| clips[i].start_us <= moved_start - epsilon);
    order.insert(insert_at, moved_idx);

    let mut shifted = 0;
    for pair in order.windows(2) {
        let prev_end = clips[pair[0]].end_us();
        let next = &mut clips[pair[1]];
        if prev_end > next.start_us {
            tracing::trace!(clip = %next.id, by_us = (prev_end - next.start_us).0, "move push");
            next.start_us = prev_end;
            shifted += 1;
        }
    }
    shifted
}

/// Latest clip end across all tracks, or zero when empty.
pub fn max_end(clips: &[Clip]) -> TimeUs {
    clips.iter().map(|c| c.end_us()).max().unwrap_or(TimeUs::ZERO)
}

/// An empty span on a track. `end_us` is `None` past the last clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub start_us: TimeUs,
    pub end_us: Option<TimeUs>,
}

impl Gap {
    /// Length of the gap, `None` if open-ended.
    pub fn len_us(&self) -> Option<TimeUs> {
        self.end_us.map(|end| end - self.start_us)
    }
}

/// Find the empty span on `track` containing `at`, or `None` if a clip covers it.
pub fn find_gap(clips: &[Clip], track: TrackKind, at: TimeUs) -> Option<Gap> {
    if at < TimeUs::ZERO {
        return None;
    }
    let on_track = || clips.iter().filter(move |c| c.track == track);

    if on_track().any(|c| c.start_us <= at && at < c.end_us()) {
        return None;
    }

    let start_us = on_track()
        .map(|c| c.end_us())
        .filter(|end| *end <= at)
        .max()
        .unwrap_or(TimeUs::ZERO);
    let end_us = on_track().map(|c| c.start_us).filter(|s| *s > at).min();

    Some(Gap { start_us, end_us })
}

/// Adjacent pairs (in start order) on `track` whose ranges overlap.
pub fn overlapping_pairs(clips: &[Clip], track: TrackKind) -> Vec<(Uuid, Uuid)> {
    let mut sorted: Vec<&Clip> = clips.iter().filter(|c| c.track == track).collect();
    sorted.sort_by_key(|c| c.start_us);
    sorted
        .windows(2)
        .filter(|pair| pair[0].end_us() > pair[1].start_us)
        .map(|pair| (pair[0].id, pair[1].id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: TimeUs = TimeUs(10_000);

    fn clip(track: TrackKind, start_s: f64, dur_s: f64) -> Clip {
        Clip::new(track, TimeUs::from_seconds(start_s), TimeUs::from_seconds(dur_s))
    }

    fn span(clips: &[Clip], id: Uuid) -> (i64, i64) {
        let c = clips.iter().find(|c| c.id == id).unwrap();
        (c.start_us.0, c.end_us().0)
    }

    // -----------------------------------------------------------------------
    // ripple_growth
    // -----------------------------------------------------------------------

    #[test]
    fn growth_pushes_abutting_neighbour() {
        let a = clip(TrackKind::Video, 0.0, 4.0);
        let b = clip(TrackKind::Video, 4.0, 4.0);
        let (a_id, b_id) = (a.id, b.id);
        let mut clips = vec![a, b];
        clips[0].duration_us = TimeUs(6_000_000);

        assert_eq!(ripple_growth(&mut clips, a_id), 1);
        assert_eq!(span(&clips, a_id), (0, 6_000_000));
        assert_eq!(span(&clips, b_id), (6_000_000, 10_000_000));
    }

    #[test]
    fn growth_cascades_through_chain() {
        let a = clip(TrackKind::Video, 0.0, 2.0);
        let b = clip(TrackKind::Video, 2.0, 2.0);
        let c = clip(TrackKind::Video, 4.5, 1.0);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        let mut clips = vec![c, b, a];
        clips[2].duration_us = TimeUs(3_000_000);

        assert_eq!(ripple_growth(&mut clips, a_id), 2);
        assert_eq!(span(&clips, b_id), (3_000_000, 5_000_000));
        assert_eq!(span(&clips, c_id), (5_000_000, 6_000_000));
    }

    #[test]
    fn growth_absorbed_by_gap_stops_walk() {
        let a = clip(TrackKind::Video, 0.0, 4.0);
        let b = clip(TrackKind::Video, 6.0, 2.0);
        let c = clip(TrackKind::Video, 8.0, 2.0);
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        let mut clips = vec![a, b, c];
        clips[0].duration_us = TimeUs(5_000_000);

        assert_eq!(ripple_growth(&mut clips, a_id), 0);
        assert_eq!(span(&clips, b_id), (6_000_000, 8_000_000));
        assert_eq!(span(&clips, c_id), (8_000_000, 10_000_000));
    }

    #[test]
    fn growth_partially_absorbed_by_gap() {
        let a = clip(TrackKind::Video, 0.0, 4.0);
        let b = clip(TrackKind::Video, 5.0, 2.0);
        let (a_id, b_id) = (a.id, b.id);
        let mut clips = vec![a, b];
        clips[0].duration_us = TimeUs(6_000_000);

        ripple_growth(&mut clips, a_id);
        assert_eq!(span(&clips, b_id), (6_000_000, 8_000_000));
    }

    #[test]
    fn growth_ignores_other_tracks_and_earlier_clips() {
        let before = clip(TrackKind::Video, 0.0, 2.0);
        let a = clip(TrackKind::Video, 2.0, 2.0);
        let sub = clip(TrackKind::Subtitle, 4.0, 2.0);
        let (before_id, a_id, sub_id) = (before.id, a.id, sub.id);
        let mut clips = vec![before, a, sub];
        clips[1].duration_us = TimeUs(5_000_000);

        assert_eq!(ripple_growth(&mut clips, a_id), 0);
        assert_eq!(span(&clips, before_id), (0, 2_000_000));
        assert_eq!(span(&clips, sub_id), (4_000_000, 6_000_000));
    }

    #[test]
    fn growth_with_no_candidates_is_noop() {
        let a = clip(TrackKind::Video, 10.0, 8.0);
        let a_id = a.id;
        let mut clips = vec![a];
        assert_eq!(ripple_growth(&mut clips, a_id), 0);
        assert_eq!(ripple_growth(&mut clips, Uuid::new_v4()), 0);
    }

    // -----------------------------------------------------------------------
    // ripple_move
    // -----------------------------------------------------------------------

    #[test]
    fn move_jump_onto_later_clip_lands_after_it() {
        // A single jump: B starts first, so A is pushed to B's end.
        let a = clip(TrackKind::Video, 0.0, 4.0);
        let b = clip(TrackKind::Video, 5.0, 4.0);
        let (a_id, b_id) = (a.id, b.id);
        let mut clips = vec![a, b];
        clips[0].start_us = TimeUs(6_000_000);

        assert_eq!(ripple_move(&mut clips, a_id, EPS), 1);
        assert_eq!(span(&clips, b_id), (5_000_000, 9_000_000));
        assert_eq!(span(&clips, a_id), (9_000_000, 13_000_000));
    }

    #[test]
    fn move_within_epsilon_wins_tie_and_reorders() {
        let a = clip(TrackKind::Video, 0.0, 4.0);
        let b = clip(TrackKind::Video, 5.0, 4.0);
        let (a_id, b_id) = (a.id, b.id);
        let mut clips = vec![a, b];
        clips[0].start_us = TimeUs(5_005_000);

        ripple_move(&mut clips, a_id, EPS);
        assert_eq!(span(&clips, a_id), (5_005_000, 9_005_000));
        assert_eq!(span(&clips, b_id), (9_005_000, 13_005_000));
    }

    #[test]
    fn move_exactly_epsilon_apart_is_not_a_tie() {
        let a = clip(TrackKind::Video, 0.0, 1.0);
        let b = clip(TrackKind::Video, 5.0, 1.0);
        let (a_id, b_id) = (a.id, b.id);
        let mut clips = vec![a, b];
        clips[0].start_us = TimeUs(5_010_000);

        ripple_move(&mut clips, a_id, EPS);
        assert_eq!(span(&clips, b_id), (5_000_000, 6_000_000));
        assert_eq!(span(&clips, a_id), (6_000_000, 7_000_000));
    }

    #[test]
    fn move_back_into_earlier_clip_is_pushed_forward() {
        let a = clip(TrackKind::Video, 0.0, 4.0);
        let m = clip(TrackKind::Video, 8.0, 2.0);
        let (a_id, m_id) = (a.id, m.id);
        let mut clips = vec![a, m];
        clips[1].start_us = TimeUs(1_000_000);

        ripple_move(&mut clips, m_id, EPS);
        assert_eq!(span(&clips, a_id), (0, 4_000_000));
        assert_eq!(span(&clips, m_id), (4_000_000, 6_000_000));
    }

    #[test]
    fn move_single_pass_does_not_close_gaps() {
        // M dropped at 1 lands behind A at 4 and pushes B; the gap before C stays.
        let a = clip(TrackKind::Video, 0.0, 4.0);
        let b = clip(TrackKind::Video, 4.0, 2.0);
        let c = clip(TrackKind::Video, 20.0, 2.0);
        let m = clip(TrackKind::Video, 12.0, 3.0);
        let (b_id, c_id, m_id) = (b.id, c.id, m.id);
        let mut clips = vec![a, b, c, m];
        clips[3].start_us = TimeUs(1_000_000);

        assert_eq!(ripple_move(&mut clips, m_id, EPS), 2);
        assert_eq!(span(&clips, m_id), (4_000_000, 7_000_000));
        assert_eq!(span(&clips, b_id), (7_000_000, 9_000_000));
        assert_eq!(span(&clips, c_id), (20_000_000, 22_000_000));
        assert!(overlapping_pairs(&clips, TrackKind::Video).is_empty());
    }

    #[test]
    fn move_into_free_space_changes_nothing_else() {
        let a = clip(TrackKind::Video, 0.0, 2.0);
        let b = clip(TrackKind::Video, 10.0, 2.0);
        let (a_id, b_id) = (a.id, b.id);
        let mut clips = vec![a, b];
        clips[0].start_us = TimeUs(5_000_000);

        assert_eq!(ripple_move(&mut clips, a_id, EPS), 0);
        assert_eq!(span(&clips, b_id), (10_000_000, 12_000_000));
    }

    // -----------------------------------------------------------------------
    // find_gap / overlapping_pairs / max_end
    // -----------------------------------------------------------------------

    #[test]
    fn find_gap_between_clips() {
        let clips = vec![
            clip(TrackKind::Video, 0.0, 10.0),
            clip(TrackKind::Video, 15.0, 5.0),
        ];
        let gap = find_gap(&clips, TrackKind::Video, TimeUs(12_000_000)).unwrap();
        assert_eq!(gap.start_us, TimeUs(10_000_000));
        assert_eq!(gap.end_us, Some(TimeUs(15_000_000)));
        assert_eq!(gap.len_us(), Some(TimeUs(5_000_000)));
    }

    #[test]
    fn find_gap_after_last_clip_is_open() {
        let clips = vec![clip(TrackKind::Video, 0.0, 10.0)];
        let gap = find_gap(&clips, TrackKind::Video, TimeUs(10_000_000)).unwrap();
        assert_eq!(gap.start_us, TimeUs(10_000_000));
        assert_eq!(gap.end_us, None);
        assert_eq!(gap.len_us(), None);
    }

    #[test]
    fn find_gap_inside_clip_is_none() {
        let clips = vec![clip(TrackKind::Video, 2.0, 3.0)];
        assert!(find_gap(&clips, TrackKind::Video, TimeUs(2_000_000)).is_none());
        assert!(find_gap(&clips, TrackKind::Video, TimeUs(-1)).is_none());
        // Other tracks do not block.
        let gap = find_gap(&clips, TrackKind::Subtitle, TimeUs(3_000_000)).unwrap();
        assert_eq!(gap.start_us, TimeUs::ZERO);
    }

    #[test]
    fn overlapping_pairs_reports_adjacent_overlaps() {
        let a = clip(TrackKind::Video, 0.0, 5.0);
        let b = clip(TrackKind::Video, 4.0, 2.0);
        let (a_id, b_id) = (a.id, b.id);
        let clips = vec![b, a, clip(TrackKind::Subtitle, 0.0, 10.0)];
        assert_eq!(overlapping_pairs(&clips, TrackKind::Video), vec![(a_id, b_id)]);
        assert!(overlapping_pairs(&clips, TrackKind::Subtitle).is_empty());
    }

    #[test]
    fn max_end_over_all_tracks() {
        assert_eq!(max_end(&[]), TimeUs::ZERO);
        let clips = vec![
            clip(TrackKind::Video, 0.0, 5.0),
            clip(TrackKind::Subtitle, 3.0, 4.0),
        ];
        assert_eq!(max_end(&clips), TimeUs(7_000_000));
    }
}
