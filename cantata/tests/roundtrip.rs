// Cantata
// Copyright (c) 2026 The Project Cantata Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! End-to-end write/read round trips through the public handle API.

use std::io::{self, Cursor, SeekFrom};

use cantata::errors::Error;
use cantata::format::{
    Endian, CODEC_FLOAT, CODEC_IMA_ADPCM, CODEC_MS_ADPCM, CODEC_PCM_16, CODEC_PCM_24,
    CODEC_VOX_ADPCM, CONTAINER_AIFF, CONTAINER_AU, CONTAINER_CAF, CONTAINER_RAW, CONTAINER_RF64,
    CONTAINER_W64, CONTAINER_WAV,
};
use cantata::io::{Bstream, MediaStream};
use cantata::{
    format_of, open_read_stream, open_raw_read_stream, open_write_stream, write_options,
    CommandReply, FileCommand, SeekWhence,
};

fn bytes_of(stream: Box<dyn MediaStream>) -> Vec<u8> {
    let mut bs = Bstream::new(stream);
    let len = bs.byte_len().unwrap() as usize;
    bs.seek(SeekFrom::Start(0)).unwrap();

    let mut data = vec![0u8; len];
    bs.read_buf_exact(&mut data).unwrap();
    data
}

fn sink() -> Box<dyn MediaStream> {
    Box::new(Cursor::new(Vec::<u8>::new()))
}

fn reopen(data: Vec<u8>) -> cantata::AudioFile {
    open_read_stream(Box::new(Cursor::new(data))).unwrap()
}

#[test]
fn wav_pcm16_layout_and_normalised_read() {
    let options = write_options(format_of(CONTAINER_WAV, CODEC_PCM_16, Endian::File), 44100, 2);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples: Vec<i16> =
        (0..200).map(|k| if k % 2 == 0 { i16::MAX } else { i16::MIN }).collect();
    assert_eq!(af.write_i16(&samples).unwrap(), 200);

    let data = bytes_of(af.close_into_stream().unwrap());

    // 44-byte header plus 400 data bytes, with the final sizes patched in.
    assert_eq!(data.len(), 444);
    assert_eq!(&data[0..4], b"RIFF");
    assert_eq!(u32::from_le_bytes(data[4..8].try_into().unwrap()), 436);
    assert_eq!(u32::from_le_bytes(data[16..20].try_into().unwrap()), 16);
    assert_eq!(&data[36..40], b"data");
    assert_eq!(u32::from_le_bytes(data[40..44].try_into().unwrap()), 400);

    let mut af = reopen(data);
    assert_eq!(af.frames(), 100);
    assert_eq!(af.channels(), 2);
    assert_eq!(af.sample_rate(), 44100);

    let mut back = vec![0f32; 200];
    assert_eq!(af.read_f32(&mut back).unwrap(), 200);

    for value in back {
        assert!((value.abs() - 1.0).abs() < 1e-3, "sample {} is not full scale", value);
    }
}

#[test]
fn aiff_pcm24_single_frame() {
    let options = write_options(format_of(CONTAINER_AIFF, CODEC_PCM_24, Endian::File), 48000, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    assert_eq!(af.write_i32(&[0x007f_ffff << 8]).unwrap(), 1);

    let data = bytes_of(af.close_into_stream().unwrap());

    // FORM(12) + COMM(26) + SSND header(16) + 3 data bytes + pad.
    assert_eq!(data.len(), 58);
    assert_eq!(&data[0..4], b"FORM");

    // The 80-bit extended 48000 Hz sample rate.
    assert_eq!(&data[28..38], &[0x40, 0x0e, 0xbb, 0x80, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

    let mut af = reopen(data);
    assert_eq!(af.frames(), 1);

    let mut back = [0i32; 1];
    assert_eq!(af.read_i32(&mut back).unwrap(), 1);
    assert_eq!(back[0], 0x007f_ffff << 8);
}

#[test]
fn rf64_auto_downgrade_rewrites_as_riff() {
    let options =
        write_options(format_of(CONTAINER_RF64, CODEC_PCM_16, Endian::Little), 48000, 2);
    let mut af = open_write_stream(sink(), options).unwrap();

    assert_eq!(
        af.command(FileCommand::SetRf64AutoDowngrade(true)).unwrap(),
        CommandReply::Bool(false)
    );

    let samples = vec![0x0102i16; 25600];
    af.write_i16(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());

    assert_eq!(&data[0..4], b"RIFF");
    assert_eq!(&data[12..16], b"JUNK");
    assert!(!data.windows(4).any(|w| w == b"ds64"));
}

#[test]
fn peak_chunk_round_trips_through_the_command() {
    let options = write_options(format_of(CONTAINER_WAV, CODEC_FLOAT, Endian::File), 44100, 2);
    let mut af = open_write_stream(sink(), options).unwrap();

    let mut samples = vec![0.125f32; 64];
    samples[6] = 0.5;
    samples[7] = -0.5;
    af.write_f32(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    let mut af = reopen(data);

    match af.command(FileCommand::GetPeak).unwrap() {
        CommandReply::Peaks(peaks) => {
            assert_eq!(peaks.len(), 2);
            assert_eq!(peaks[0].value, 0.5);
            assert_eq!(peaks[0].position, 3);
            assert_eq!(peaks[1].value, 0.5);
            assert_eq!(peaks[1].position, 3);
        }
        other => panic!("unexpected reply {:?}", other),
    }
}

#[test]
fn unknown_chunks_pass_through_byte_for_byte() {
    let options = write_options(format_of(CONTAINER_WAV, CODEC_PCM_16, Endian::File), 8000, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    af.set_chunk(b"XYZ1", &[0, 1, 2, 3, 4, 5, 6, 7]).unwrap();
    af.set_chunk(b"XYZ2", &[0xff, 0xfe, 0xfd]).unwrap();
    af.write_i16(&[0i16; 8]).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    let mut af = reopen(data);

    let cursor = af.chunk_iter_start(Some(b"XYZ1")).unwrap();
    assert_eq!(af.chunk_len(cursor), Some(8));
    assert_eq!(&af.chunk_data(cursor).unwrap()[..], &[0, 1, 2, 3, 4, 5, 6, 7]);

    let cursor = af.chunk_iter_start(Some(b"XYZ2")).unwrap();
    assert_eq!(af.chunk_len(cursor), Some(3));
    assert_eq!(&af.chunk_data(cursor).unwrap()[..], &[0xff, 0xfe, 0xfd]);
}

#[test]
fn zero_frame_files_report_zero_frames() {
    let options = write_options(format_of(CONTAINER_WAV, CODEC_PCM_16, Endian::File), 44100, 2);
    let af = open_write_stream(sink(), options).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    assert_eq!(data.len(), 44);

    let af = reopen(data);
    assert_eq!(af.frames(), 0);
}

/// A write-only sink that refuses seeks, standing in for a pipe.
struct PipeSink;

impl MediaStream for PipeSink {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }

    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(io::ErrorKind::Unsupported.into())
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }

    fn set_byte_len(&mut self, _len: u64) -> io::Result<()> {
        Err(io::ErrorKind::Unsupported.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_pipe(&self) -> bool {
        true
    }
}

#[test]
fn pipes_reject_patched_containers_but_accept_au() {
    let wav = write_options(format_of(CONTAINER_WAV, CODEC_PCM_16, Endian::File), 8000, 1);
    assert!(matches!(
        open_write_stream(Box::new(PipeSink), wav),
        Err(Error::PipeWriteNotSupported)
    ));

    let au = write_options(format_of(CONTAINER_AU, CODEC_PCM_16, Endian::File), 8000, 1);
    let mut af = open_write_stream(Box::new(PipeSink), au).unwrap();
    af.write_i16(&[1i16, 2, 3, 4]).unwrap();
    af.close().unwrap();
}

#[test]
fn rifx_round_trips_and_reports_endswap() {
    let options = write_options(format_of(CONTAINER_WAV, CODEC_PCM_16, Endian::Big), 22050, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples: Vec<i16> = (-50..50).collect();
    af.write_i16(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    assert_eq!(&data[0..4], b"RIFX");

    let mut af = reopen(data);
    let mut back = vec![0i16; 100];
    af.read_i16(&mut back).unwrap();
    assert_eq!(back, samples);

    // Raw big-endian words need a swap on a little-endian host.
    let reply = af.command(FileCommand::RawNeedsEndswap).unwrap();
    assert_eq!(reply, CommandReply::Bool(cfg!(target_endian = "little")));
}

fn slow_ramp(len: usize, step: i16) -> Vec<i16> {
    let mut value = 0i32;
    let mut dir = i32::from(step);
    (0..len)
        .map(|_| {
            value += dir;
            if value.abs() > 20000 {
                dir = -dir;
            }
            value as i16
        })
        .collect()
}

#[test]
fn wav_ima_adpcm_round_trips_within_tolerance() {
    let options =
        write_options(format_of(CONTAINER_WAV, CODEC_IMA_ADPCM, Endian::File), 8000, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples = slow_ramp(1600, 23);
    af.write_i16(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    let mut af = reopen(data);

    assert_eq!(af.format().codec(), CODEC_IMA_ADPCM);
    assert_eq!(af.frames(), 1600);

    let mut back = vec![0i16; 1600];
    assert_eq!(af.read_i16(&mut back).unwrap(), 1600);

    for (index, (a, b)) in samples.iter().zip(back.iter()).enumerate() {
        let err = (i32::from(*a) - i32::from(*b)).abs();
        assert!(err <= 256, "sample {}: {} vs {}", index, a, b);
    }
}

#[test]
fn wav_ms_adpcm_round_trips_within_tolerance() {
    let options =
        write_options(format_of(CONTAINER_WAV, CODEC_MS_ADPCM, Endian::File), 8000, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples = slow_ramp(1100, 31);
    af.write_i16(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    let mut af = reopen(data);

    assert_eq!(af.format().codec(), CODEC_MS_ADPCM);
    assert_eq!(af.frames(), 1100);

    let mut back = vec![0i16; 1100];
    assert_eq!(af.read_i16(&mut back).unwrap(), 1100);

    for (index, (a, b)) in samples.iter().zip(back.iter()).enumerate() {
        let err = (i32::from(*a) - i32::from(*b)).abs();
        assert!(err <= 512, "sample {}: {} vs {}", index, a, b);
    }
}

#[test]
fn aifc_ima4_round_trips_within_tolerance() {
    let options =
        write_options(format_of(CONTAINER_AIFF, CODEC_IMA_ADPCM, Endian::File), 22050, 2);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples = slow_ramp(256 * 2, 17);
    af.write_i16(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    assert!(data.windows(4).any(|w| w == b"ima4"));

    let mut af = reopen(data);
    assert_eq!(af.frames(), 256);

    let mut back = vec![0i16; 256 * 2];
    assert_eq!(af.read_i16(&mut back).unwrap(), 256 * 2);

    for (index, (a, b)) in samples.iter().zip(back.iter()).enumerate() {
        let err = (i32::from(*a) - i32::from(*b)).abs();
        assert!(err <= 256, "sample {}: {} vs {}", index, a, b);
    }
}

#[test]
fn caf_float_keeps_samples_bit_exact() {
    let options = write_options(format_of(CONTAINER_CAF, CODEC_FLOAT, Endian::File), 96000, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples: Vec<f32> = (0..257).map(|k| (k as f32 / 257.0) - 0.5).collect();
    af.write_f32(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    assert_eq!(&data[0..4], b"caff");

    let mut af = reopen(data);
    assert_eq!(af.frames(), 257);
    assert!(af.state().peak.is_some());

    let mut back = vec![0f32; 257];
    af.read_f32(&mut back).unwrap();
    assert_eq!(back, samples);
}

#[test]
fn vox_adpcm_round_trips_through_the_raw_container() {
    let options =
        write_options(format_of(CONTAINER_RAW, CODEC_VOX_ADPCM, Endian::File), 8000, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples = slow_ramp(2000, 16 * 17);
    af.write_i16(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    assert_eq!(data.len(), 1000);

    let mut af = open_raw_read_stream(Box::new(Cursor::new(data)), options).unwrap();
    assert_eq!(af.frames(), 2000);

    let mut back = vec![0i16; 2000];
    assert_eq!(af.read_i16(&mut back).unwrap(), 2000);

    for (index, (a, b)) in samples.iter().zip(back.iter()).enumerate() {
        let err = (i32::from(*a) - i32::from(*b)).abs();
        assert!(err <= 2048, "sample {}: {} vs {}", index, a, b);
    }
}

#[test]
fn w64_round_trips() {
    let options = write_options(format_of(CONTAINER_W64, CODEC_PCM_16, Endian::File), 32000, 2);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples: Vec<i16> = (0..512).map(|k| (k * 31) as i16).collect();
    af.write_i16(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    assert_eq!(&data[0..4], b"riff");

    let mut af = reopen(data);
    assert_eq!(af.frames(), 256);

    let mut back = vec![0i16; 512];
    af.read_i16(&mut back).unwrap();
    assert_eq!(back, samples);
}

#[test]
fn seeking_repositions_both_cursors() {
    let options = write_options(format_of(CONTAINER_WAV, CODEC_PCM_16, Endian::File), 8000, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples: Vec<i16> = (0..100).collect();
    af.write_i16(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    let mut af = reopen(data);

    af.seek(50, SeekWhence::Start).unwrap();
    let mut back = [0i16; 4];
    af.read_i16(&mut back).unwrap();
    assert_eq!(back, [50, 51, 52, 53]);

    af.seek(-10, SeekWhence::End).unwrap();
    af.read_i16(&mut back).unwrap();
    assert_eq!(back, [90, 91, 92, 93]);

    assert!(af.seek(1000, SeekWhence::Start).is_err());
}

#[test]
fn strings_round_trip_in_wav_and_aiff() {
    for container in [CONTAINER_WAV, CONTAINER_AIFF] {
        let options = write_options(format_of(container, CODEC_PCM_16, Endian::File), 8000, 1);
        let mut af = open_write_stream(sink(), options).unwrap();

        af.command(FileCommand::SetString(cantata::StringTag::Title, "tune".into())).unwrap();
        af.command(FileCommand::SetString(cantata::StringTag::Artist, "nobody".into())).unwrap();
        af.write_i16(&[0i16; 16]).unwrap();

        let data = bytes_of(af.close_into_stream().unwrap());
        let mut af = reopen(data);

        assert_eq!(
            af.command(FileCommand::GetString(cantata::StringTag::Title)).unwrap(),
            CommandReply::Text(Some("tune".to_string()))
        );
        assert_eq!(
            af.command(FileCommand::GetString(cantata::StringTag::Artist)).unwrap(),
            CommandReply::Text(Some("nobody".to_string()))
        );
    }
}

#[test]
fn au_round_trips_and_garbage_is_rejected() {
    let options = write_options(format_of(CONTAINER_AU, CODEC_PCM_16, Endian::File), 11025, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    let samples: Vec<i16> = (0..64).map(|k| k * 100).collect();
    af.write_i16(&samples).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    assert_eq!(&data[0..4], b".snd");

    let mut af = reopen(data);
    assert_eq!(af.frames(), 64);

    let mut back = vec![0i16; 64];
    af.read_i16(&mut back).unwrap();
    assert_eq!(back, samples);

    assert!(matches!(
        open_read_stream(Box::new(Cursor::new(b"not audio at all".to_vec()))),
        Err(Error::UnrecognizedFormat)
    ));
}

#[test]
fn truncate_shortens_the_file() {
    let options = write_options(format_of(CONTAINER_WAV, CODEC_PCM_16, Endian::File), 8000, 1);
    let mut af = open_write_stream(sink(), options).unwrap();

    af.write_i16(&[7i16; 100]).unwrap();
    af.command(FileCommand::TruncateFrames(40)).unwrap();

    let data = bytes_of(af.close_into_stream().unwrap());
    let af = reopen(data);
    assert_eq!(af.frames(), 40);
}
