//! Round-trip law: any sequence of glyph edits survives snapshot -> encode -> decode.

use art_core::{
    BackgroundProvenance, Canvas, DocumentSnapshot, GlyphId, ImageData, ImageHandle, Point,
};
use proptest::prelude::*;
use url::Url;

#[derive(Debug, Clone)]
enum Edit {
    Add { text: String, size: i32, x: i32, y: i32 },
    Reposition { index: usize, x: i32, y: i32 },
    Move { index: usize, dx: i32, dy: i32 },
    Resize { index: usize, factor: f64 },
}

fn arb_edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        ("\\PC{1,4}", 1i32..200, -2000i32..2000, -2000i32..2000)
            .prop_map(|(text, size, x, y)| Edit::Add { text, size, x, y }),
        (any::<usize>(), -2000i32..2000, -2000i32..2000)
            .prop_map(|(index, x, y)| Edit::Reposition { index, x, y }),
        (any::<usize>(), -50i32..50, -50i32..50)
            .prop_map(|(index, dx, dy)| Edit::Move { index, dx, dy }),
        (any::<usize>(), 0.1f64..4.0).prop_map(|(index, factor)| Edit::Resize { index, factor }),
    ]
}

fn background() -> ImageHandle {
    ImageHandle::new(ImageData {
        width: 2,
        height: 2,
        rgba: vec![255; 16],
        encoded: None,
    })
}

fn pick(ids: &[GlyphId], index: usize) -> Option<GlyphId> {
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()])
    }
}

proptest! {
    #[test]
    fn prop_snapshot_round_trip_preserves_glyphs(
        edits in prop::collection::vec(arb_edit(), 0..40),
        remote in any::<bool>(),
    ) {
        let mut canvas = Canvas::default();
        let provenance = if remote {
            BackgroundProvenance::Remote(Url::parse("https://example.com/bg.png").expect("url"))
        } else {
            BackgroundProvenance::Embedded(vec![0x89, 0x50, 0x4E, 0x47])
        };
        canvas.set_background(background(), provenance);

        let mut ids = Vec::new();
        for edit in edits {
            match edit {
                Edit::Add { text, size, x, y } => {
                    ids.push(canvas.add_glyph(text, size, Point::new(x, y)));
                }
                Edit::Reposition { index, x, y } => {
                    if let Some(id) = pick(&ids, index) {
                        canvas.reposition_glyph(id, Point::new(x, y)).expect("reposition");
                    }
                }
                Edit::Move { index, dx, dy } => {
                    if let Some(id) = pick(&ids, index) {
                        canvas.move_glyph_by(id, Point::new(dx, dy)).expect("move");
                    }
                }
                Edit::Resize { index, factor } => {
                    if let Some(id) = pick(&ids, index) {
                        canvas.resize_glyph(id, factor).expect("resize");
                    }
                }
            }
        }

        let snapshot = canvas.to_snapshot().expect("background is set");
        let decoded = DocumentSnapshot::decode(&snapshot.encode().expect("encode")).expect("decode");
        let live: Vec<_> = canvas.glyphs().map(|g| g.placement.clone()).collect();
        prop_assert_eq!(&decoded.glyphs, &live);
        prop_assert_eq!(decoded, snapshot);
    }
}
