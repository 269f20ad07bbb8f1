use crate::error::InitDataError;
use crate::scheme::ProtectionScheme;

/**
    Smallest valid PSSH box: size(4) + type(4) + version(1) + flags(3)
    + system_id(16) + data_size(4).
*/
const MIN_BOX_SIZE: usize = 32;

/**
    One `pssh` box found in protection init data.

    ISOBMFF PSSH box layout:
      [0..4]    box_size: u32 big-endian
      [4..8]    box_type: "pssh"
      [8]       version: u8 (0 or 1)
      [9..12]   flags: u24
      [12..28]  system_id: 16 bytes
      if version == 1:
        [28..32]  key_id_count: u32 big-endian
        [32..]    key_ids: key_id_count * 16 bytes
      [..]      data_size: u32 big-endian
      [..]      data: data_size bytes
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PsshEntry {
    pub version: u8,
    pub scheme: ProtectionScheme,
    pub key_ids: Vec<[u8; 16]>,
    /// Scheme-specific payload inside the box.
    pub data: Vec<u8>,
    /// The complete box, header included.
    pub raw: Vec<u8>,
}

/**
    Protection init data as handed over by the demuxer.

    Either a run of concatenated `pssh` boxes (one per advertised scheme)
    or an opaque scheme-specific blob that is passed through untouched.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitData {
    bytes: Vec<u8>,
    boxes: Vec<PsshEntry>,
}

impl InitData {
    /**
        Parse raw init data.

        Input that starts like a PSSH box must be a well-formed sequence of
        PSSH boxes; anything else is kept as an opaque payload.
    */
    pub fn parse(input: &[u8]) -> Result<Self, InitDataError> {
        if input.is_empty() {
            return Err(InitDataError::Empty);
        }

        let boxes = if looks_like_pssh(input) {
            parse_boxes(input)?
        } else {
            Vec::new()
        };

        Ok(Self {
            bytes: input.to_vec(),
            boxes,
        })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, InitDataError> {
        let bytes = data_encoding::BASE64
            .decode(encoded.trim().as_bytes())
            .map_err(|e| InitDataError::InvalidBase64(e.to_string()))?;
        Self::parse(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn boxes(&self) -> &[PsshEntry] {
        &self.boxes
    }

    /**
        Returns `true` when the init data is not in PSSH box form.
    */
    pub fn is_opaque(&self) -> bool {
        self.boxes.is_empty()
    }

    /**
        First box carrying the given scheme's system ID.
    */
    pub fn box_for(&self, scheme: ProtectionScheme) -> Option<&PsshEntry> {
        self.boxes.iter().find(|b| b.scheme == scheme)
    }

    /**
        Schemes advertised by the boxes, in box order, without duplicates.
    */
    pub fn schemes(&self) -> Vec<ProtectionScheme> {
        let mut out: Vec<ProtectionScheme> = Vec::with_capacity(self.boxes.len());
        for b in &self.boxes {
            if !out.contains(&b.scheme) {
                out.push(b.scheme);
            }
        }
        out
    }

    /**
        Key IDs listed in v1 box headers, first occurrence wins.

        v0 boxes keep their key IDs inside the scheme-specific payload,
        which only the crypto provider understands.
    */
    pub fn key_ids(&self) -> Vec<[u8; 16]> {
        let mut out: Vec<[u8; 16]> = Vec::new();
        for kid in self.boxes.iter().flat_map(|b| b.key_ids.iter()) {
            if !out.contains(kid) {
                out.push(*kid);
            }
        }
        out
    }

    /**
        Bytes to hand to the crypto provider for the given scheme: the
        matching box when there is one, the original input otherwise.
    */
    pub fn payload_for(&self, scheme: ProtectionScheme) -> &[u8] {
        match self.box_for(scheme) {
            Some(b) => &b.raw,
            None => &self.bytes,
        }
    }
}

fn looks_like_pssh(input: &[u8]) -> bool {
    input.len() >= 8 && &input[4..8] == b"pssh"
}

fn parse_boxes(input: &[u8]) -> Result<Vec<PsshEntry>, InitDataError> {
    let mut boxes = Vec::new();
    let mut offset = 0;
    while offset < input.len() {
        let entry = parse_box(&input[offset..]).map_err(|reason| InitDataError::Malformed {
            offset,
            reason,
        })?;
        offset += entry.raw.len();
        boxes.push(entry);
    }
    Ok(boxes)
}

fn parse_box(input: &[u8]) -> Result<PsshEntry, String> {
    if input.len() < MIN_BOX_SIZE {
        return Err("input too short for PSSH box header".into());
    }

    let box_size = read_u32_be(input, 0) as usize;
    if box_size < MIN_BOX_SIZE {
        return Err(format!("box_size {box_size} below minimum"));
    }
    if box_size > input.len() {
        return Err("box_size exceeds input length".into());
    }

    let data = &input[..box_size];
    if &data[4..8] != b"pssh" {
        return Err("box_type is not 'pssh'".into());
    }

    let version = data[8];
    if version > 1 {
        return Err(format!("unsupported version {version}"));
    }

    let mut system_id = [0u8; 16];
    system_id.copy_from_slice(&data[12..28]);

    let mut offset = 28;
    let mut key_ids = Vec::new();

    if version == 1 {
        check_bounds(data, offset, 4, "key_id_count")?;
        let kid_count = read_u32_be(data, offset) as usize;
        offset += 4;

        let kid_bytes = kid_count
            .checked_mul(16)
            .ok_or_else(|| "key_id_count overflow".to_string())?;
        check_bounds(data, offset, kid_bytes, "key_ids")?;
        for chunk in data[offset..offset + kid_bytes].chunks_exact(16) {
            let mut kid = [0u8; 16];
            kid.copy_from_slice(chunk);
            key_ids.push(kid);
        }
        offset += kid_bytes;
    }

    check_bounds(data, offset, 4, "data_size")?;
    let data_size = read_u32_be(data, offset) as usize;
    offset += 4;

    check_bounds(data, offset, data_size, "data")?;
    let payload = data[offset..offset + data_size].to_vec();
    offset += data_size;

    if offset != box_size {
        return Err(format!(
            "trailing bytes: consumed {offset}, box_size {box_size}"
        ));
    }

    Ok(PsshEntry {
        version,
        scheme: ProtectionScheme::from_system_id(system_id),
        key_ids,
        data: payload,
        raw: data.to_vec(),
    })
}

fn read_u32_be(data: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn check_bounds(data: &[u8], offset: usize, need: usize, field: &str) -> Result<(), String> {
    match offset.checked_add(need) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(format!("truncated {field}")),
    }
}
