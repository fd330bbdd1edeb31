//! Fixed-layout wire schema for telemetry samples.
//!
//! A sample is a single 249-byte frame with no header, delimiter or length
//! field; framing on the stream is purely by size. Fields are packed in
//! declaration order with no padding: flag fields occupy one byte (nonzero =
//! set), analog fields are IEEE-754 `f32` in little-endian byte order. The
//! layout is part of the wire contract shared with the acquisition server
//! and must never be reordered.

use std::fmt;
use std::io::{self, Write};

/// One rendered scalar channel value.
///
/// Flags print as `0`/`1`, analogs in their shortest exact decimal form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Analog(f32),
    Flag(bool),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Analog(v) => write!(f, "{}", v),
            Value::Flag(b) => write!(f, "{}", u8::from(*b)),
        }
    }
}

/// Control-system sub-record: one flag per digital input, one `f32` per
/// analog channel. 149 bytes on the wire.
///
/// Channel tags follow the plant instrument naming: `TT` temperature, `FI`
/// flow, `LT` level, `CT` conductivity, `PHT` pH, `RT` radiation, `JT`/`KT`
/// power, `IG` digital inputs, `SPARE_AIxx` unassigned analog inputs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PlcChannels {
    pub read: bool,
    pub ig01: bool,
    pub ig02: bool,
    pub ig03: bool,
    pub ig04: bool,
    pub jt01: f32,
    pub jt02: f32,
    pub jt03: f32,
    pub kt01: f32,
    pub tt01: f32,
    pub tt02: f32,
    pub tt03: f32,
    pub tt04: f32,
    pub tt05: f32,
    pub tt06: f32,
    pub tt07: f32,
    pub tt08: f32,
    pub ttxx: f32,
    pub ct01: f32,
    pub ct02: f32,
    pub fi01: f32,
    pub fi02: f32,
    pub lt01: f32,
    pub pht01: f32,
    pub rt01: f32,
    pub rt02: f32,
    pub rt03: f32,
    pub rt04: f32,
    pub rt05: f32,
    pub rt06: f32,
    pub spare_ai11: f32,
    pub spare_ai12: f32,
    pub spare_ai13: f32,
    pub spare_ai14: f32,
    pub spare_ai15: f32,
    pub spare_ai16: f32,
    pub spare_ai17: f32,
    pub spare_ai18: f32,
    pub spare_ai19: f32,
    pub spare_ai20: f32,
    pub spare_ai21: f32,
}

/// Detector-channel sub-record. 50 bytes on the wire.
///
/// `N_RATE`/`T_RATE` are the neutron and temperature count rates, `CAL_F1`..
/// `CAL_F3` the calibration factors, `EMR_*`/`WRN_*` the emergency and
/// warning thresholds and their latched flags, `R1`..`R3` the relay outputs.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpuChannels {
    pub read: bool,
    pub n_rate: f32,
    pub t_rate: f32,
    pub cal_f1: f32,
    pub cal_f2: f32,
    pub cal_f3: f32,
    pub emr_n_threshold: f32,
    pub wrn_n_threshold: f32,
    pub emr_t_threshold: f32,
    pub wrn_t_threshold: f32,
    pub emr_n: bool,
    pub wrn_n: bool,
    pub emr_t: bool,
    pub wrn_t: bool,
    pub r1: bool,
    pub r2: bool,
    pub r3: bool,
    pub rdy: bool,
    pub test: bool,
    pub spare: f32,
}

/// One complete telemetry sample: the control-system group plus both
/// detector channels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleRecord {
    pub plc: PlcChannels,
    pub spu_a: SpuChannels,
    pub spu_b: SpuChannels,
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn flag(&mut self) -> bool {
        let v = self.buf[self.pos];
        self.pos += 1;
        v != 0
    }

    fn analog(&mut self) -> f32 {
        let p = self.pos;
        self.pos += 4;
        f32::from_le_bytes([self.buf[p], self.buf[p + 1], self.buf[p + 2], self.buf[p + 3]])
    }
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Writer<'_> {
    fn flag(&mut self, v: bool) {
        self.buf[self.pos] = u8::from(v);
        self.pos += 1;
    }

    fn analog(&mut self, v: f32) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&v.to_le_bytes());
        self.pos += 4;
    }
}

impl PlcChannels {
    /// 5 flags + 36 analogs.
    pub const WIRE_SIZE: usize = 5 + 36 * 4;
    pub const FIELD_COUNT: usize = 41;

    fn decode(r: &mut Reader<'_>) -> Self {
        Self {
            read: r.flag(),
            ig01: r.flag(),
            ig02: r.flag(),
            ig03: r.flag(),
            ig04: r.flag(),
            jt01: r.analog(),
            jt02: r.analog(),
            jt03: r.analog(),
            kt01: r.analog(),
            tt01: r.analog(),
            tt02: r.analog(),
            tt03: r.analog(),
            tt04: r.analog(),
            tt05: r.analog(),
            tt06: r.analog(),
            tt07: r.analog(),
            tt08: r.analog(),
            ttxx: r.analog(),
            ct01: r.analog(),
            ct02: r.analog(),
            fi01: r.analog(),
            fi02: r.analog(),
            lt01: r.analog(),
            pht01: r.analog(),
            rt01: r.analog(),
            rt02: r.analog(),
            rt03: r.analog(),
            rt04: r.analog(),
            rt05: r.analog(),
            rt06: r.analog(),
            spare_ai11: r.analog(),
            spare_ai12: r.analog(),
            spare_ai13: r.analog(),
            spare_ai14: r.analog(),
            spare_ai15: r.analog(),
            spare_ai16: r.analog(),
            spare_ai17: r.analog(),
            spare_ai18: r.analog(),
            spare_ai19: r.analog(),
            spare_ai20: r.analog(),
            spare_ai21: r.analog(),
        }
    }

    fn encode(&self, w: &mut Writer<'_>) {
        w.flag(self.read);
        w.flag(self.ig01);
        w.flag(self.ig02);
        w.flag(self.ig03);
        w.flag(self.ig04);
        w.analog(self.jt01);
        w.analog(self.jt02);
        w.analog(self.jt03);
        w.analog(self.kt01);
        w.analog(self.tt01);
        w.analog(self.tt02);
        w.analog(self.tt03);
        w.analog(self.tt04);
        w.analog(self.tt05);
        w.analog(self.tt06);
        w.analog(self.tt07);
        w.analog(self.tt08);
        w.analog(self.ttxx);
        w.analog(self.ct01);
        w.analog(self.ct02);
        w.analog(self.fi01);
        w.analog(self.fi02);
        w.analog(self.lt01);
        w.analog(self.pht01);
        w.analog(self.rt01);
        w.analog(self.rt02);
        w.analog(self.rt03);
        w.analog(self.rt04);
        w.analog(self.rt05);
        w.analog(self.rt06);
        w.analog(self.spare_ai11);
        w.analog(self.spare_ai12);
        w.analog(self.spare_ai13);
        w.analog(self.spare_ai14);
        w.analog(self.spare_ai15);
        w.analog(self.spare_ai16);
        w.analog(self.spare_ai17);
        w.analog(self.spare_ai18);
        w.analog(self.spare_ai19);
        w.analog(self.spare_ai20);
        w.analog(self.spare_ai21);
    }

    /// Channels in wire order, which is also the rendering order.
    pub fn fields(&self) -> [(&'static str, Value); Self::FIELD_COUNT] {
        [
            ("READ", Value::Flag(self.read)),
            ("IG01", Value::Flag(self.ig01)),
            ("IG02", Value::Flag(self.ig02)),
            ("IG03", Value::Flag(self.ig03)),
            ("IG04", Value::Flag(self.ig04)),
            ("JT01", Value::Analog(self.jt01)),
            ("JT02", Value::Analog(self.jt02)),
            ("JT03", Value::Analog(self.jt03)),
            ("KT01", Value::Analog(self.kt01)),
            ("TT01", Value::Analog(self.tt01)),
            ("TT02", Value::Analog(self.tt02)),
            ("TT03", Value::Analog(self.tt03)),
            ("TT04", Value::Analog(self.tt04)),
            ("TT05", Value::Analog(self.tt05)),
            ("TT06", Value::Analog(self.tt06)),
            ("TT07", Value::Analog(self.tt07)),
            ("TT08", Value::Analog(self.tt08)),
            ("TTXX", Value::Analog(self.ttxx)),
            ("CT01", Value::Analog(self.ct01)),
            ("CT02", Value::Analog(self.ct02)),
            ("FI01", Value::Analog(self.fi01)),
            ("FI02", Value::Analog(self.fi02)),
            ("LT01", Value::Analog(self.lt01)),
            ("PHT01", Value::Analog(self.pht01)),
            ("RT01", Value::Analog(self.rt01)),
            ("RT02", Value::Analog(self.rt02)),
            ("RT03", Value::Analog(self.rt03)),
            ("RT04", Value::Analog(self.rt04)),
            ("RT05", Value::Analog(self.rt05)),
            ("RT06", Value::Analog(self.rt06)),
            ("SPARE_AI11", Value::Analog(self.spare_ai11)),
            ("SPARE_AI12", Value::Analog(self.spare_ai12)),
            ("SPARE_AI13", Value::Analog(self.spare_ai13)),
            ("SPARE_AI14", Value::Analog(self.spare_ai14)),
            ("SPARE_AI15", Value::Analog(self.spare_ai15)),
            ("SPARE_AI16", Value::Analog(self.spare_ai16)),
            ("SPARE_AI17", Value::Analog(self.spare_ai17)),
            ("SPARE_AI18", Value::Analog(self.spare_ai18)),
            ("SPARE_AI19", Value::Analog(self.spare_ai19)),
            ("SPARE_AI20", Value::Analog(self.spare_ai20)),
            ("SPARE_AI21", Value::Analog(self.spare_ai21)),
        ]
    }
}

impl SpuChannels {
    /// 10 flags + 10 analogs.
    pub const WIRE_SIZE: usize = 10 + 10 * 4;
    pub const FIELD_COUNT: usize = 20;

    fn decode(r: &mut Reader<'_>) -> Self {
        Self {
            read: r.flag(),
            n_rate: r.analog(),
            t_rate: r.analog(),
            cal_f1: r.analog(),
            cal_f2: r.analog(),
            cal_f3: r.analog(),
            emr_n_threshold: r.analog(),
            wrn_n_threshold: r.analog(),
            emr_t_threshold: r.analog(),
            wrn_t_threshold: r.analog(),
            emr_n: r.flag(),
            wrn_n: r.flag(),
            emr_t: r.flag(),
            wrn_t: r.flag(),
            r1: r.flag(),
            r2: r.flag(),
            r3: r.flag(),
            rdy: r.flag(),
            test: r.flag(),
            spare: r.analog(),
        }
    }

    fn encode(&self, w: &mut Writer<'_>) {
        w.flag(self.read);
        w.analog(self.n_rate);
        w.analog(self.t_rate);
        w.analog(self.cal_f1);
        w.analog(self.cal_f2);
        w.analog(self.cal_f3);
        w.analog(self.emr_n_threshold);
        w.analog(self.wrn_n_threshold);
        w.analog(self.emr_t_threshold);
        w.analog(self.wrn_t_threshold);
        w.flag(self.emr_n);
        w.flag(self.wrn_n);
        w.flag(self.emr_t);
        w.flag(self.wrn_t);
        w.flag(self.r1);
        w.flag(self.r2);
        w.flag(self.r3);
        w.flag(self.rdy);
        w.flag(self.test);
        w.analog(self.spare);
    }

    /// Channels in wire order, which is also the rendering order.
    pub fn fields(&self) -> [(&'static str, Value); Self::FIELD_COUNT] {
        [
            ("READ", Value::Flag(self.read)),
            ("N_RATE", Value::Analog(self.n_rate)),
            ("T_RATE", Value::Analog(self.t_rate)),
            ("CAL_F1", Value::Analog(self.cal_f1)),
            ("CAL_F2", Value::Analog(self.cal_f2)),
            ("CAL_F3", Value::Analog(self.cal_f3)),
            ("EMR_N_THRESHOLD", Value::Analog(self.emr_n_threshold)),
            ("WRN_N_THRESHOLD", Value::Analog(self.wrn_n_threshold)),
            ("EMR_T_THRESHOLD", Value::Analog(self.emr_t_threshold)),
            ("WRN_T_THRESHOLD", Value::Analog(self.wrn_t_threshold)),
            ("EMR_N", Value::Flag(self.emr_n)),
            ("WRN_N", Value::Flag(self.wrn_n)),
            ("EMR_T", Value::Flag(self.emr_t)),
            ("WRN_T", Value::Flag(self.wrn_t)),
            ("R1", Value::Flag(self.r1)),
            ("R2", Value::Flag(self.r2)),
            ("R3", Value::Flag(self.r3)),
            ("RDY", Value::Flag(self.rdy)),
            ("TEST", Value::Flag(self.test)),
            ("SPARE", Value::Analog(self.spare)),
        ]
    }
}

impl SampleRecord {
    pub const WIRE_SIZE: usize = PlcChannels::WIRE_SIZE + 2 * SpuChannels::WIRE_SIZE;
    pub const FIELD_COUNT: usize = PlcChannels::FIELD_COUNT + 2 * SpuChannels::FIELD_COUNT;

    /// Decodes one wire frame. Infallible: the buffer size is fixed by the
    /// type and every bit pattern is a valid field value.
    pub fn decode(buf: &[u8; Self::WIRE_SIZE]) -> Self {
        let mut r = Reader { buf, pos: 0 };
        let record = Self {
            plc: PlcChannels::decode(&mut r),
            spu_a: SpuChannels::decode(&mut r),
            spu_b: SpuChannels::decode(&mut r),
        };
        debug_assert_eq!(r.pos, Self::WIRE_SIZE);
        record
    }

    /// Encodes the record into one wire frame, the exact inverse of
    /// [`decode`](Self::decode).
    pub fn encode(&self) -> [u8; Self::WIRE_SIZE] {
        let mut buf = [0u8; Self::WIRE_SIZE];
        let mut w = Writer {
            buf: &mut buf,
            pos: 0,
        };
        self.plc.encode(&mut w);
        self.spu_a.encode(&mut w);
        self.spu_b.encode(&mut w);
        debug_assert_eq!(w.pos, Self::WIRE_SIZE);
        buf
    }

    /// Writes one log block: timestamp header, the three channel sections
    /// with one `SECTION_TAG: value` line per channel, then four blank
    /// separator lines.
    pub fn write_block<W: Write>(&self, mut w: W, timestamp: &str) -> io::Result<()> {
        writeln!(w, "##### {} ####", timestamp)?;
        let plc = self.plc.fields();
        let spu_a = self.spu_a.fields();
        let spu_b = self.spu_b.fields();
        let sections: [(&str, &[(&str, Value)]); 3] =
            [("PLC", &plc), ("SPU_CHA", &spu_a), ("SPU_CHB", &spu_b)];
        for (prefix, fields) in sections {
            writeln!(w, "{:-<24}", prefix)?;
            for (tag, value) in fields {
                writeln!(w, "{}_{}: {}", prefix, tag, value)?;
            }
        }
        for _ in 0..4 {
            writeln!(w)?;
        }
        Ok(())
    }
}
