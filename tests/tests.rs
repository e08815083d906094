use movi_tiles::{
    encode, unpack_dictionary, CapacityError, DecodeError, DecoderBuilder, EncodeError, Encoder,
    Scene, SequencerSettings,
};
use proptest::prelude::*;

// xorshift, so fixtures stay reproducible without extra dependencies
fn noise(seed: u32, len: usize, colors: u8) -> Vec<u8> {
    let mut state = seed.max(1);
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state % u32::from(colors)) as u8 + 1
        })
        .collect()
}

fn decode_all(width: usize, height: usize, scene: &Scene, index_bits: u32) -> Vec<Vec<u8>> {
    let mut frame = vec![0u8; width * height];
    let mut out = Vec::new();

    for encoded in &scene.frames {
        let mut decoder = DecoderBuilder::for_frame(width, height, &mut frame)
            .dictionary(&scene.dictionary)
            .palette(&scene.palette)
            .index_bits(index_bits)
            .build()
            .unwrap();
        decoder
            .decode(&encoded.bitstream, &encoded.maskstream)
            .unwrap();
        drop(decoder);
        out.push(frame.clone());
    }

    out
}

#[test]
fn round_trip_moving_sprite() {
    let (width, height) = (64, 32);
    let background = noise(7, width * height, 3);
    let frames: Vec<Vec<u8>> = (0..6)
        .map(|step| {
            let mut frame = background.clone();
            for y in 8..20 {
                for x in 0..10 {
                    frame[y * width + x + step * 5] = 200 + (x as u8 % 4);
                }
            }
            frame
        })
        .collect();

    let scene = encode(width, height, &frames).unwrap();
    assert_eq!(decode_all(width, height, &scene, 12), frames);
}

#[test]
fn round_trip_every_tile_class() {
    let (width, height) = (16, 16);
    let mut frame = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let (tx, ty) = (x / 4, y / 4);
            frame[y * width + x] = match (tx, ty) {
                // solid
                (0, 0) => 9,
                // checkerboard
                (1, 0) => [3, 4][(x + y) % 2],
                // 2, 4, 8 and 16 color masks
                (2, 0) => [5, 6][(x / 2) % 2],
                (3, 0) => [10, 11, 12, 13][x % 4],
                (_, 1) => [20, 21, 22, 23, 24, 25, 26, 27][(x + y * 2) % 8],
                _ => 30 + ((x % 4) + (y % 4) * 4) as u8,
            };
        }
    }
    let second: Vec<u8> = frame.iter().map(|&p| if p > 25 { p + 100 } else { p }).collect();
    let frames = vec![frame, second];

    let scene = encode(width, height, &frames).unwrap();
    assert_eq!(decode_all(width, height, &scene, 12), frames);
}

#[test]
fn round_trip_through_extension_blocks() {
    let (width, height) = (32, 32);
    let frames = vec![noise(1, width * height, 250), noise(2, width * height, 250)];
    let settings = SequencerSettings::new(6, 8);

    let mut encoder = Encoder::new(width, height);
    encoder.with_settings(settings);
    for frame in &frames {
        encoder.add_frame(frame).unwrap();
    }
    let scene = encoder.encode().unwrap();

    assert!(scene.dictionary.iter().any(|w| w.is_long_offset()));
    assert_eq!(decode_all(width, height, &scene, 6), frames);
}

#[test]
fn dictionary_overflow_is_a_capacity_error() {
    let (width, height) = (64, 64);
    let mut encoder = Encoder::new(width, height);
    encoder.with_settings(SequencerSettings::new(2, 2));
    encoder.add_frame(&noise(3, width * height, 250)).unwrap();

    match encoder.encode() {
        Err(EncodeError::Capacity(CapacityError::Dictionary {
            required,
            available,
        })) => {
            assert_eq!(available, 34);
            assert!(required > available);
        }
        other => panic!("expected a dictionary overflow, got {:?}", other.map(|_| ())),
    }
}

fn assert_windows_in_palette(scene: &Scene) {
    for word in scene.dictionary.iter().filter(|w| !w.is_long_offset()) {
        if let Some(size) = word.control_type().palette_size() {
            let end = word.parameter() as usize + size;
            assert!(end <= scene.palette.len(), "{} ends at {} of {}", word, end, scene.palette.len());
        }
    }
}

#[test]
fn palette_windows_stay_in_the_buffer() {
    // three colors select from a four entry window
    let cycle: Vec<u8> = (0..16).map(|i| [1, 2, 3][i % 3]).collect();
    let scene = encode(4, 4, &[&cycle]).unwrap();
    assert_eq!(scene.palette.len(), 4);
    assert_windows_in_palette(&scene);

    let frames = vec![noise(31, 64 * 32, 40), noise(32, 64 * 32, 6)];
    let scene = encode(64, 32, &frames).unwrap();
    assert_windows_in_palette(&scene);
    assert_eq!(decode_all(64, 32, &scene, 12), frames);
}

#[test]
fn encoding_is_deterministic() {
    let frames = vec![noise(11, 32 * 16, 40), noise(12, 32 * 16, 40)];
    let a = encode(32, 16, &frames).unwrap();
    let b = encode(32, 16, &frames).unwrap();
    assert_eq!(a, b);
}

#[test]
fn packed_dictionary_round_trips() {
    let frames = vec![noise(5, 32 * 32, 12)];
    let scene = encode(32, 32, &frames).unwrap();
    let packed = scene.packed_dictionary();
    assert_eq!(unpack_dictionary(&packed).unwrap(), scene.dictionary);
}

#[test]
fn decoders_share_a_scene() {
    let frames = vec![noise(21, 16 * 16, 30), noise(22, 16 * 16, 30)];
    let scene = encode(16, 16, &frames).unwrap();

    let mut left = vec![0u8; 16 * 16];
    let mut right = vec![0u8; 16 * 16];
    let mut a = DecoderBuilder::for_frame(16, 16, &mut left)
        .dictionary(&scene.dictionary)
        .palette(&scene.palette)
        .build()
        .unwrap();
    let mut b = DecoderBuilder::for_frame(16, 16, &mut right)
        .dictionary(&scene.dictionary)
        .palette(&scene.palette)
        .build()
        .unwrap();
    for encoded in &scene.frames {
        a.decode(&encoded.bitstream, &encoded.maskstream).unwrap();
        b.decode(&encoded.bitstream, &encoded.maskstream).unwrap();
    }
    drop((a, b));

    assert_eq!(left, frames[1]);
    assert_eq!(right, frames[1]);
}

#[test]
fn truncated_dictionary_is_corrupt() {
    let frames = vec![noise(9, 16 * 16, 30)];
    let scene = encode(16, 16, &frames).unwrap();
    let encoded = &scene.frames[0];

    let mut frame = vec![0u8; 16 * 16];
    let err = DecoderBuilder::for_frame(16, 16, &mut frame)
        .palette(&scene.palette)
        .build()
        .unwrap()
        .decode(&encoded.bitstream, &encoded.maskstream)
        .unwrap_err();
    assert!(matches!(err, DecodeError::IndexOutOfRange { len: 0, .. }));
}

#[test]
fn decode_logging_traces_tiles() {
    let frames = vec![vec![4u8; 8 * 8]];
    let scene = encode(8, 8, &frames).unwrap();
    let mut log = Vec::new();
    let mut frame = vec![0u8; 64];
    DecoderBuilder::for_frame(8, 8, &mut frame)
        .dictionary(&scene.dictionary)
        .with_logging(&mut log)
        .build()
        .unwrap()
        .decode(&scene.frames[0].bitstream, &scene.frames[0].maskstream)
        .unwrap();

    let log = String::from_utf8(log).unwrap();
    assert_eq!(log.lines().count(), 4);
    assert!(log.contains("static"));
}

fn scene_strategy() -> impl Strategy<Value = (usize, usize, Vec<Vec<u8>>)> {
    (1usize..4, 1usize..4, 1usize..4).prop_flat_map(|(tw, th, n)| {
        let len = tw * 4 * th * 4;
        (
            Just(tw * 4),
            Just(th * 4),
            prop::collection::vec(prop::collection::vec(1u8..=255, len), n),
        )
    })
}

proptest! {
    #[test]
    fn round_trip_nonzero_frames((width, height, frames) in scene_strategy()) {
        let scene = encode(width, height, &frames).unwrap();
        assert_windows_in_palette(&scene);
        prop_assert_eq!(decode_all(width, height, &scene, 12), frames);
    }

    #[test]
    fn nonzero_pixels_survive_zeros((width, height, frames) in scene_strategy()) {
        // fold a quarter of the colors onto zero
        let frames: Vec<Vec<u8>> = frames
            .into_iter()
            .map(|f| f.into_iter().map(|p| if p < 64 { 0 } else { p }).collect())
            .collect();
        let scene = encode(width, height, &frames).unwrap();

        for (decoded, original) in decode_all(width, height, &scene, 12).iter().zip(&frames) {
            for (&d, &o) in decoded.iter().zip(original) {
                if o != 0 {
                    prop_assert_eq!(d, o);
                }
            }
        }
    }
}
