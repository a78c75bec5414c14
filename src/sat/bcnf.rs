use std::{fs, io, path};
use std::io::Read;

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};

use crate::sat::{Formula, Lit};

// A chunk header announcing more than this is treated as a corrupt file.
pub const CHUNK_LIMIT: u32 = 1 << 20;

const BYTE_ORDER_MARKER: u32 = 0x0102_0304;


// Binary CNF: a 16-byte header ("BCNF" magic, byte-order marker, variable
// count, clause count) followed by chunks of 32-bit records. Each chunk
// starts with its word count; the payload is a run of clauses stored as
// [size, lit...] with packed literal indices.
pub fn parse_file<P: AsRef<path::Path>>(path: P) -> io::Result<Formula> {
    let mut stream = io::BufReader::new(fs::File::open(path)?);

    let mut header = [0u8; 16];
    stream.read_exact(&mut header)?;
    if &header[0..4] != b"BCNF" {
        return Err(data_error("not a BCNF file"));
    }
    if LittleEndian::read_u32(&header[4..8]) != BYTE_ORDER_MARKER {
        return Err(data_error("BCNF file in wrong byte order"));
    }
    let num_vars = LittleEndian::read_u32(&header[8..12]) as usize;
    let num_clauses = LittleEndian::read_u32(&header[12..16]) as usize;

    let mut formula = Formula::new();
    formula.ensure_vars(num_vars);

    let mut chunk: Vec<i32> = Vec::new();
    loop {
        let words = match stream.read_u32::<LittleEndian>() {
            Ok(w) => w,
            Err(ref e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e),
        };
        if words > CHUNK_LIMIT {
            return Err(data_error(&format!(
                "chunk of {} words exceeds the {} word limit",
                words, CHUNK_LIMIT
            )));
        }

        chunk.clear();
        for _ in 0..words {
            chunk.push(stream.read_i32::<LittleEndian>()?);
        }

        let mut p = 0;
        while p < chunk.len() {
            let size = chunk[p] as usize;
            p += 1;
            if size == 0 || p + size > chunk.len() {
                return Err(data_error("truncated clause in chunk"));
            }
            let lits = chunk[p..p + size]
                .iter()
                .map(|&ix| {
                    let lit = Lit::from_index(ix as usize);
                    if lit.var().index() >= num_vars {
                        Err(data_error("literal references an undeclared variable"))
                    } else {
                        Ok(lit)
                    }
                })
                .collect::<io::Result<Vec<Lit>>>()?;
            p += size;
            formula.add_clause(lits);
        }
    }

    if formula.num_clauses() != num_clauses {
        return Err(data_error(&format!(
            "header declares {} clauses, file holds {}",
            num_clauses,
            formula.num_clauses()
        )));
    }

    Ok(formula)
}

fn data_error(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("PARSE ERROR! {}", msg))
}
