// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use anyhow::bail;
use ndarray::Array2;
use structopt::StructOpt;

use quoll::facet::*;
use quoll::image::{write_image_copy, Image};

/// Make a clean mask for one facet: 1 for pixels assigned to the facet, 0
/// everywhere else. Uses the facet centres cached by create-facets or
/// create-grid-facets; the distance matrix is reused when it's still valid,
/// or recomputed otherwise.
#[derive(StructOpt, Debug)]
#[structopt(name = "create-facet-mask")]
struct Opts {
    /// The image to derive the mask from (only its shape and WCS matter).
    #[structopt(long, parse(from_str))]
    image: PathBuf,

    /// The 1-based facet id to make the mask for, matching the numbering of
    /// the facet model images.
    #[structopt(long)]
    facetid: usize,

    /// Maximum facet radius [degrees]. Pixels further than this from every
    /// centre belong to no facet.
    #[structopt(long = "max", default_value = "4.0")]
    max_radius: f64,

    /// Where the facet centres and distance matrix are cached.
    #[structopt(long, default_value = ".", parse(from_str))]
    cache_dir: PathBuf,
}

fn main() -> Result<(), anyhow::Error> {
    let opts = Opts::from_args();

    let image = Image::open(&opts.image)?;
    let (ny, nx) = image.data.dim();

    let store = FacetStore::new(&opts.cache_dir);
    let centres = match store.load_centres()? {
        Some(centres) => centres,
        None => bail!(
            "No cached facet centres in {}; run create-facets or create-grid-facets first",
            opts.cache_dir.display()
        ),
    };
    if opts.facetid < 1 || opts.facetid > centres.len() {
        bail!(
            "--facetid {} is out of range; there are {} facets",
            opts.facetid,
            centres.len()
        );
    }

    // The cached distances might belong to a different image.
    let dists = match store.load_dists()? {
        Some(dists) if dists.dim() == (centres.len(), ny * nx) => dists,
        _ => {
            eprint!("Recomputing pixel distances to facet centres... ");
            let grid = pixel_grid(&image.wcs, ny, nx);
            let dists = distance_matrix(&centres, &grid);
            eprintln!("Done");
            dists
        }
    };

    let assignment = assign(&dists, opts.max_radius);
    let facet = (opts.facetid - 1) as i32;
    let mut mask = Array2::zeros((ny, nx));
    for (p, &a) in assignment.iter().enumerate() {
        if a == facet {
            mask[(p / nx, p % nx)] = 1.0;
        }
    }

    let dest = PathBuf::from(format!("facet-{}-mask.fits", opts.facetid));
    write_image_copy(&image.path, &dest, &mask)?;

    Ok(())
}
