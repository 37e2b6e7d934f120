use chrono::{NaiveDate, NaiveTime};
use fleetline_core::repository::{first_conflict, AssignmentWindow};
use fleetline_core::TripWindow;
use fleetline_shared::TripSchedule;
use proptest::prelude::*;
use uuid::Uuid;

fn schedule_strategy() -> impl Strategy<Value = TripSchedule> {
    (0u32..60, 0u32..24 * 60, 0u32..24 * 60)
        .prop_filter("zero-length trips are rejected", |(_, dep, ret)| dep != ret)
        .prop_map(|(day, dep, ret)| {
            let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(day as i64);
            TripSchedule::new(
                date,
                NaiveTime::from_hms_opt(dep / 60, dep % 60, 0).unwrap(),
                NaiveTime::from_hms_opt(ret / 60, ret % 60, 0).unwrap(),
            )
        })
}

proptest! {
    #[test]
    fn overlap_is_symmetric(a in schedule_strategy(), b in schedule_strategy()) {
        let a = TripWindow::of(&a).unwrap();
        let b = TripWindow::of(&b).unwrap();
        prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
    }

    #[test]
    fn window_is_never_empty(s in schedule_strategy()) {
        let w = TripWindow::of(&s).unwrap();
        prop_assert!(w.end > w.start);
        prop_assert!(w.duration() < chrono::Duration::hours(24));
        if s.is_overnight() {
            prop_assert_eq!(w.end.date(), s.date.succ_opt().unwrap());
        } else {
            prop_assert_eq!(w.end.date(), s.date);
        }
    }

    #[test]
    fn candidate_dates_cover_every_overlap(a in schedule_strategy(), b in schedule_strategy()) {
        let wa = TripWindow::of(&a).unwrap();
        let wb = TripWindow::of(&b).unwrap();
        if wa.overlaps(&wb) {
            let (from, to) = wa.candidate_dates();
            prop_assert!(b.date >= from && b.date <= to);
        }
    }

    #[test]
    fn first_conflict_agrees_with_overlap(a in schedule_strategy(), b in schedule_strategy()) {
        let held = vec![AssignmentWindow { trip_id: Uuid::new_v4(), schedule: a }];
        let wb = TripWindow::of(&b).unwrap();
        let expected = TripWindow::of(&a).unwrap().overlaps(&wb);
        prop_assert_eq!(first_conflict(&held, &wb, None).is_some(), expected);
    }
}
