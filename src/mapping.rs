//! In-memory mapping profiles: descriptor positions, mapping cells, and
//! the line grammar described in §6.4 (file I/O itself is out of scope;
//! callers supply already-read lines from wherever they got them).

use crate::codes::{self, EventType};
use crate::error::{WiiError, WiiResult};

/// A per-absolute-axis range, as reported to the synthetic device and
/// consulted by the translator for scaling and dead-zone math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsRange {
    pub min: i32,
    pub max: i32,
    pub fuzz: i32,
    pub flat: i32,
}

/// A mapping cell: what a descriptor position is wired to.
///
/// The source material keeps `ButtonMapping` and `AxisMapping` as
/// separate classes discriminated by `_type`; here both shapes collapse
/// into one struct since the translator (§4.7) reads whichever fields
/// the selected rule needs based on the target's event type and the
/// position's natural-axis-ness, never on which "kind" the entry was
/// constructed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub target_type: EventType,
    pub codes: [u16; 2],
    pub code_count: u8,
    /// Threshold used when a natural-axis source drives a `KEY` target,
    /// or a shake pseudo-button's magnitude threshold. `0` means "use
    /// the rule's own default" (30 for axis→key, 260 for shake).
    pub sensitivity: i32,
    /// Divisor applied to the raw source value before emission
    /// (`v * A.max / source_scale`). `0` disables scaling.
    pub source_scale: i32,
    /// Dead-zone percentage in `0..=100`.
    pub dead_zone_pct: u8,
    pub inverted: bool,
}

impl MappingEntry {
    pub(crate) fn new(target_type: EventType, codes: &[u16]) -> Self {
        let mut arr = [0u16; 2];
        arr[..codes.len()].copy_from_slice(codes);
        Self {
            target_type,
            codes: arr,
            code_count: codes.len() as u8,
            sensitivity: 0,
            source_scale: 0,
            dead_zone_pct: 0,
            inverted: false,
        }
    }

    pub fn code(&self) -> u16 {
        self.codes[0]
    }

    pub fn second_code(&self) -> Option<u16> {
        (self.code_count >= 2).then_some(self.codes[1])
    }
}

/// A descriptor position belonging to one of the four controller-kind
/// namespaces. Implementors enumerate their own fixed set of positions
/// so that [`Mapping<P>`] can index a plain array by position instead
/// of a hash map, mirroring the "ordered array" the source keeps per
/// `Description` class.
pub trait DescriptorPosition: Copy + Eq + 'static {
    /// Every position of this kind, in a stable order used for indexing.
    fn all() -> &'static [Self];
    /// The lowercase token this position is named by in a mapping line
    /// (e.g. `"a"`, `"accelx"`, `"thumbl"`).
    fn token(&self) -> &'static str;
    /// Whether this position is an analog source (stick, accelerometer,
    /// trigger) as opposed to a digital button.
    fn is_natural_axis(&self) -> bool;
    /// The absolute-axis range reported to the synthetic device for
    /// this position, if it is a natural axis.
    fn abs_range(&self) -> Option<AbsRange>;

    fn index(&self) -> usize {
        Self::all().iter().position(|p| p == self).expect("position is a member of Self::all()")
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.token().eq_ignore_ascii_case(token))
    }
}

const WIIMOTE_ACCEL: AbsRange = AbsRange { min: -500, max: 500, fuzz: 2, flat: 4 };
const NUNCHUK_STICK: AbsRange = AbsRange { min: -120, max: 120, fuzz: 2, flat: 4 };
const CLASSIC_RANGE: AbsRange = AbsRange { min: -30, max: 30, fuzz: 1, flat: 1 };
const PRO_RANGE: AbsRange = AbsRange { min: -0x400, max: 0x400, fuzz: 4, flat: 100 };

macro_rules! descriptor_enum {
    ($name:ident { $($variant:ident => $token:literal $(, axis = $range:expr)?);* $(;)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name { $($variant),* }

        impl DescriptorPosition for $name {
            fn all() -> &'static [Self] {
                &[$(Self::$variant),*]
            }

            fn token(&self) -> &'static str {
                match self {
                    $(Self::$variant => $token),*
                }
            }

            #[allow(unreachable_patterns)]
            fn is_natural_axis(&self) -> bool {
                match self {
                    $($(Self::$variant => { let _: AbsRange = $range; true },)?)*
                    _ => false,
                }
            }

            #[allow(unreachable_patterns)]
            fn abs_range(&self) -> Option<AbsRange> {
                match self {
                    $($(Self::$variant => Some($range),)?)*
                    _ => None,
                }
            }
        }
    };
}

descriptor_enum! {
    WiimotePos {
        A => "a";
        B => "b";
        One => "1";
        Two => "2";
        Minus => "minus";
        Home => "home";
        Plus => "plus";
        Left => "left";
        Right => "right";
        Up => "up";
        Down => "down";
        Shake => "shake";
        AccelX => "accelx", axis = WIIMOTE_ACCEL;
        AccelY => "accely", axis = WIIMOTE_ACCEL;
        AccelZ => "accelz", axis = WIIMOTE_ACCEL;
    }
}

descriptor_enum! {
    NunchukPos {
        A => "a";
        B => "b";
        One => "1";
        Two => "2";
        Minus => "minus";
        Home => "home";
        Plus => "plus";
        Left => "left";
        Right => "right";
        Up => "up";
        Down => "down";
        Shake => "shake";
        AccelX => "accelx", axis = WIIMOTE_ACCEL;
        AccelY => "accely", axis = WIIMOTE_ACCEL;
        AccelZ => "accelz", axis = WIIMOTE_ACCEL;
        C => "c";
        Z => "z";
        AxisX => "axisx", axis = NUNCHUK_STICK;
        AxisY => "axisy", axis = NUNCHUK_STICK;
        NShake => "nshake";
        NAccelX => "naccelx", axis = WIIMOTE_ACCEL;
        NAccelY => "naccely", axis = WIIMOTE_ACCEL;
        NAccelZ => "naccelz", axis = WIIMOTE_ACCEL;
    }
}

descriptor_enum! {
    ClassicPos {
        A => "a";
        B => "b";
        X => "x";
        Y => "y";
        Minus => "minus";
        Home => "home";
        Plus => "plus";
        Left => "left";
        Right => "right";
        Up => "up";
        Down => "down";
        TL => "tl";
        TR => "tr";
        ZL => "zl";
        ZR => "zr";
        AxisX => "axisx", axis = CLASSIC_RANGE;
        AxisY => "axisy", axis = CLASSIC_RANGE;
        AxisRX => "axisrx", axis = CLASSIC_RANGE;
        AxisRY => "axisry", axis = CLASSIC_RANGE;
        AxisLT => "axislt", axis = CLASSIC_RANGE;
        AxisRT => "axisrt", axis = CLASSIC_RANGE;
    }
}

descriptor_enum! {
    ProPos {
        A => "a";
        B => "b";
        X => "x";
        Y => "y";
        Minus => "minus";
        Home => "home";
        Plus => "plus";
        Left => "left";
        Right => "right";
        Up => "up";
        Down => "down";
        TL => "tl";
        TR => "tr";
        ZL => "zl";
        ZR => "zr";
        AxisX => "axisx", axis = PRO_RANGE;
        AxisY => "axisy", axis = PRO_RANGE;
        AxisRX => "axisrx", axis = PRO_RANGE;
        AxisRY => "axisry", axis = PRO_RANGE;
        ThumbL => "thumbl";
        ThumbR => "thumbr";
    }
}

/// A mapping from descriptor positions of one controller kind to
/// synthetic-event targets, indexed as a plain array.
#[derive(Debug, Clone)]
pub struct Mapping<P: DescriptorPosition> {
    entries: Vec<Option<MappingEntry>>,
    _phantom: std::marker::PhantomData<P>,
}

impl<P: DescriptorPosition> Default for Mapping<P> {
    fn default() -> Self {
        Self {
            entries: vec![None; P::all().len()],
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<P: DescriptorPosition> Mapping<P> {
    pub fn get(&self, pos: P) -> Option<&MappingEntry> {
        self.entries[pos.index()].as_ref()
    }

    pub fn set(&mut self, pos: P, entry: MappingEntry) {
        self.entries[pos.index()] = Some(entry);
    }

    /// Iterates over every populated (position, entry) pair.
    pub fn iter(&self) -> impl Iterator<Item = (P, &MappingEntry)> {
        P::all().iter().copied().filter_map(move |p| self.get(p).map(|e| (p, e)))
    }

    /// Whether any populated cell targets a gamepad-recognized code
    /// (§6: the Xorg-keyboard-blacklist rename trigger).
    pub fn is_gamepad(&self) -> bool {
        self.iter().any(|(_, e)| codes::is_gamepad_bit(e.target_type, e.code()))
    }
}

/// The four logical controller kinds a mapping profile may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerKind {
    Wiimote,
    WiimoteNunchuk,
    Classic,
    Pro,
}

impl ControllerKind {
    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix.to_ascii_lowercase().as_str() {
            "wiimote" => Some(Self::Wiimote),
            "wiimotenunchuk" => Some(Self::WiimoteNunchuk),
            "classic" => Some(Self::Classic),
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }
}

/// A named collection of up to four per-kind [`Mapping`]s.
#[derive(Debug, Clone, Default)]
pub struct MappingProfile {
    pub name: String,
    pub wiimote: Mapping<WiimotePos>,
    pub wiimote_nunchuk: Mapping<NunchukPos>,
    pub classic: Mapping<ClassicPos>,
    pub pro: Mapping<ProPos>,
}

impl MappingProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Parses and applies one mapping line (`source = target[,target2]
    /// [^sensitivity] [%deadzone] [inverted]`). Malformed lines, unknown
    /// codes, and mixed code families are reported as errors rather than
    /// applied; per §7 the caller is expected to log and skip, not abort
    /// the whole profile.
    pub fn apply_line(&mut self, line: &str) -> WiiResult<()> {
        let (kind, token, entry) = parse_line(line)?;
        match kind {
            ControllerKind::Wiimote => {
                let pos = WiimotePos::from_token(&token)
                    .ok_or_else(|| WiiError::MalformedLine(line.to_string()))?;
                self.wiimote.set(pos, entry);
            }
            ControllerKind::WiimoteNunchuk => {
                let pos = NunchukPos::from_token(&token)
                    .ok_or_else(|| WiiError::MalformedLine(line.to_string()))?;
                self.wiimote_nunchuk.set(pos, entry);
            }
            ControllerKind::Classic => {
                let pos = ClassicPos::from_token(&token)
                    .ok_or_else(|| WiiError::MalformedLine(line.to_string()))?;
                self.classic.set(pos, entry);
            }
            ControllerKind::Pro => {
                let pos = ProPos::from_token(&token)
                    .ok_or_else(|| WiiError::MalformedLine(line.to_string()))?;
                self.pro.set(pos, entry);
            }
        }
        Ok(())
    }
}

/// Parses one mapping line into its controller kind, position token,
/// and the resulting [`MappingEntry`]. Blank lines and `#`-comments are
/// rejected as malformed (the caller decides whether to skip them
/// before calling, as [`MappingProfile::apply_line`] does not special-case
/// them).
fn parse_line(line: &str) -> WiiResult<(ControllerKind, String, MappingEntry)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Err(WiiError::MalformedLine(line.to_string()));
    }
    let (lhs, rhs) = line
        .split_once('=')
        .ok_or_else(|| WiiError::MalformedLine(line.to_string()))?;
    let (prefix, pos_token) = lhs
        .trim()
        .split_once('.')
        .ok_or_else(|| WiiError::MalformedLine(line.to_string()))?;
    let kind =
        ControllerKind::from_prefix(prefix).ok_or_else(|| WiiError::MalformedLine(line.to_string()))?;

    let mut inverted = false;
    let mut sensitivity = 0i32;
    let mut dead_zone_pct = 0u8;
    let mut codes_part: Option<&str> = None;
    for tok in rhs.split_whitespace() {
        if tok.eq_ignore_ascii_case("inverted") {
            inverted = true;
        } else if let Some(rest) = tok.strip_prefix('^') {
            sensitivity = rest.parse().map_err(|_| WiiError::MalformedLine(line.to_string()))?;
        } else if let Some(rest) = tok.strip_prefix('%') {
            let raw: i32 = rest.parse().map_err(|_| WiiError::MalformedLine(line.to_string()))?;
            dead_zone_pct = raw.clamp(0, 100) as u8;
        } else if codes_part.is_none() {
            codes_part = Some(tok);
        } else {
            return Err(WiiError::MalformedLine(line.to_string()));
        }
    }
    let codes_part = codes_part.ok_or_else(|| WiiError::MalformedLine(line.to_string()))?;

    let mut target_type = None;
    let mut codes = Vec::with_capacity(2);
    for name in codes_part.split(',') {
        let (ty, code) = codes::lookup(name.trim()).ok_or_else(|| WiiError::UnknownCode(name.to_string()))?;
        match target_type {
            None => target_type = Some(ty),
            Some(existing) if existing == ty => {}
            Some(_) => return Err(WiiError::MixedCodeFamily),
        }
        codes.push(code);
    }
    if codes.is_empty() || codes.len() > 2 {
        return Err(WiiError::MalformedLine(line.to_string()));
    }

    let mut entry = MappingEntry::new(target_type.unwrap(), &codes);
    entry.sensitivity = sensitivity;
    entry.source_scale = sensitivity;
    entry.dead_zone_pct = dead_zone_pct;
    entry.inverted = inverted;
    Ok((kind, pos_token.to_string(), entry))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_button_line() {
        let (kind, token, entry) = parse_line("wiimote.a = BTN_A").unwrap();
        assert_eq!(kind, ControllerKind::Wiimote);
        assert_eq!(token, "a");
        assert_eq!(entry.target_type, EventType::Key);
        assert_eq!(entry.code(), codes::BTN_A);
    }

    #[test]
    fn parses_axis_line_with_modifiers() {
        let (_, _, entry) = parse_line("pro.axisx = ABS_X ^600 %20 inverted").unwrap();
        assert_eq!(entry.target_type, EventType::Abs);
        assert_eq!(entry.source_scale, 600);
        assert_eq!(entry.dead_zone_pct, 20);
        assert!(entry.inverted);
    }

    #[test]
    fn parses_split_axis_targets() {
        let (_, _, entry) = parse_line("classic.axislt = ABS_Z,ABS_RZ").unwrap();
        assert_eq!(entry.code_count, 2);
        assert_eq!(entry.second_code(), Some(codes::ABS_RZ));
    }

    #[test]
    fn rejects_mixed_code_families() {
        assert!(matches!(parse_line("classic.a = BTN_A,ABS_X"), Err(WiiError::MixedCodeFamily)));
    }

    #[test]
    fn rejects_unknown_code() {
        assert!(matches!(parse_line("wiimote.a = NOT_REAL"), Err(WiiError::UnknownCode(_))));
    }

    #[test]
    fn rejects_unknown_prefix() {
        assert!(parse_line("gamecube.a = BTN_A").is_err());
    }

    #[test]
    fn dead_zone_clamped_to_one_hundred() {
        let (_, _, entry) = parse_line("pro.axisx = ABS_X %250").unwrap();
        assert_eq!(entry.dead_zone_pct, 100);
    }

    #[test]
    fn applying_line_sets_the_right_kind_mapping() {
        let mut profile = MappingProfile::new("test");
        profile.apply_line("wiimote.a = BTN_A").unwrap();
        assert!(profile.wiimote.get(WiimotePos::A).is_some());
        assert!(profile.wiimote_nunchuk.get(NunchukPos::A).is_none());
    }

    #[test]
    fn gamepad_detection_follows_target_codes() {
        let mut profile = MappingProfile::new("test");
        assert!(!profile.classic.is_gamepad());
        profile.apply_line("classic.axisx = ABS_X").unwrap();
        assert!(profile.classic.is_gamepad());
    }
}
